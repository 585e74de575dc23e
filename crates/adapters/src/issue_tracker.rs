// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `IssueTracker` fake for exercising the pipeline without a real tracker
//! client (the real HTTP/webhook/GraphQL/OAuth client is deliberately out
//! of this workspace's scope, §1).

#![cfg(any(test, feature = "test-support"))]

use async_trait::async_trait;
use dispatch_core::{Activity, IssueContext, IssueId, IssueTracker, SessionKey, TrackerError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCall {
    FetchIssue { issue_id: IssueId },
    PostComment { issue_id: IssueId, markdown: String },
    EmitActivity { session_id: SessionKey, activity: Activity },
}

/// Fake `IssueTracker` seeded with canned [`IssueContext`]s, recording every
/// call for assertion.
#[derive(Clone, Default)]
pub struct FakeIssueTracker {
    issues: Arc<Mutex<HashMap<IssueId, IssueContext>>>,
    calls: Arc<Mutex<Vec<TrackerCall>>>,
    /// When set, `post_comment` returns this error instead of succeeding
    /// (§7 "IssueTracker failure ... comment is retried best-effort").
    fail_post_comment: Arc<Mutex<bool>>,
}

impl FakeIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_issue(&self, issue: IssueContext) {
        self.issues.lock().insert(issue.id.clone(), issue);
    }

    pub fn set_fail_post_comment(&self, fail: bool) {
        *self.fail_post_comment.lock() = fail;
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().clone()
    }

    pub fn comments_for(&self, issue_id: &IssueId) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                TrackerCall::PostComment { issue_id: id, markdown } if id == issue_id => {
                    Some(markdown.clone())
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl IssueTracker for FakeIssueTracker {
    async fn fetch_issue(&self, issue_id: &IssueId) -> Result<IssueContext, TrackerError> {
        self.calls.lock().push(TrackerCall::FetchIssue {
            issue_id: issue_id.clone(),
        });
        self.issues
            .lock()
            .get(issue_id)
            .cloned()
            .ok_or_else(|| TrackerError::Request(format!("no such issue: {issue_id}")))
    }

    async fn post_comment(&self, issue_id: &IssueId, markdown: &str) -> Result<(), TrackerError> {
        self.calls.lock().push(TrackerCall::PostComment {
            issue_id: issue_id.clone(),
            markdown: markdown.to_string(),
        });
        if *self.fail_post_comment.lock() {
            return Err(TrackerError::Request("injected failure".into()));
        }
        Ok(())
    }

    async fn emit_activity(
        &self,
        session_id: &SessionKey,
        activity: Activity,
    ) -> Result<(), TrackerError> {
        self.calls.lock().push(TrackerCall::EmitActivity {
            session_id: session_id.clone(),
            activity,
        });
        Ok(())
    }
}
