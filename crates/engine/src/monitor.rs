// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background Monitor (§4.6): periodic stale detection, orphan recovery,
//! and retention pruning, each inside its own locked mutation.

use crate::pipeline::Pipeline;
use dispatch_core::{
    AgentRunner, Clock, DispatchStatus, IssueIdentifier, IssueTracker, NotificationKind,
    NotificationPayload, Notifier, PromptBuilder, SystemClock,
};
use dispatch_storage::{transition, FsStateWriter, StateWriter, TransitionPatch};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub staled: Vec<IssueIdentifier>,
    pub recovered: Vec<IssueIdentifier>,
    pub pruned: usize,
}

pub struct BackgroundMonitor<R, T, N, P, W = FsStateWriter, C = SystemClock>
where
    R: AgentRunner + 'static,
    T: IssueTracker + 'static,
    N: Notifier,
    P: PromptBuilder,
    W: StateWriter,
    C: Clock,
{
    pipeline: Arc<Pipeline<R, T, N, P, W, C>>,
}

impl<R, T, N, P, W, C> BackgroundMonitor<R, T, N, P, W, C>
where
    R: AgentRunner + 'static,
    T: IssueTracker + 'static,
    N: Notifier,
    P: PromptBuilder,
    W: StateWriter,
    C: Clock,
{
    pub fn new(pipeline: Arc<Pipeline<R, T, N, P, W, C>>) -> Self {
        Self { pipeline }
    }

    /// Runs all three duties once. Callers that want a long-lived
    /// background task drive this in a loop on `monitorTickMs` (default
    /// 5 minutes) — scheduling that loop is left to the embedder, as this
    /// workspace has no process/runtime-lifecycle owner of its own.
    pub async fn tick(&self) -> MonitorSummary {
        MonitorSummary {
            staled: self.stale_sweep().await,
            recovered: self.recover_orphans().await,
            pruned: self.prune_completed().await,
        }
    }

    /// §4.6 duty 1: any active dispatch idle past `staleMaxAgeMs` is
    /// escalated to `stuck`, using its *current* status as the CAS
    /// expected-from so a concurrently-transitioned record is skipped
    /// rather than clobbered.
    async fn stale_sweep(&self) -> Vec<IssueIdentifier> {
        let now = self.pipeline.clock().epoch_ms();
        let threshold = self.pipeline.config().stale_max_age_ms;

        let staled = self
            .pipeline
            .store()
            .mutate(|state| {
                let candidates: Vec<(IssueIdentifier, DispatchStatus)> = state
                    .dispatches
                    .active
                    .iter()
                    .filter(|(_, record)| now.saturating_sub(record.dispatched_at_ms) > threshold)
                    .map(|(id, record)| (id.clone(), record.status))
                    .collect();

                let mut staled = Vec::new();
                for (identifier, status) in candidates {
                    let mut patch = TransitionPatch::default();
                    patch.stuck_reason = Some(Some("stale_no_progress".to_string()));
                    if transition(state, &identifier, status, DispatchStatus::Stuck, patch).is_ok() {
                        staled.push(identifier);
                    }
                }
                Ok::<_, Infallible>(staled)
            })
            .unwrap_or_default();

        for identifier in &staled {
            self.pipeline
                .notifier()
                .notify(
                    NotificationKind::Stuck,
                    NotificationPayload {
                        identifier: identifier.clone(),
                        title: identifier.to_string(),
                        status: "stuck".into(),
                        attempt: None,
                        reason: Some("stale_no_progress".into()),
                        verdict: None,
                    },
                )
                .await;
        }
        staled
    }

    /// §4.6 duty 2: a `working` dispatch with a worker session but no audit
    /// session means the audit trigger was missed. Best-effort: a CAS
    /// mismatch inside `trigger_audit` or a tracker fetch failure just
    /// skips that record for this tick.
    async fn recover_orphans(&self) -> Vec<IssueIdentifier> {
        let state = match self.pipeline.store().read() {
            Ok(state) => state,
            Err(err) => {
                warn!(%err, "recovery: failed to read store");
                return Vec::new();
            }
        };

        let orphans: Vec<_> = state
            .dispatches
            .active
            .iter()
            .filter(|(_, record)| {
                record.status == DispatchStatus::Working
                    && record.worker_session_key.is_some()
                    && record.audit_session_key.is_none()
            })
            .map(|(id, record)| (id.clone(), record.issue_id.clone(), record.attempt))
            .collect();

        let mut recovered = Vec::new();
        for (identifier, issue_id, attempt) in orphans {
            let issue = match self.pipeline.tracker().fetch_issue(&issue_id).await {
                Ok(issue) => issue,
                Err(err) => {
                    warn!(%err, %identifier, "recovery: failed to fetch issue, skipping");
                    continue;
                }
            };
            match self.pipeline.trigger_audit(&identifier, &issue, attempt).await {
                Ok(()) => recovered.push(identifier),
                Err(err) => warn!(%err, %identifier, "recovery: trigger_audit did not apply"),
            }
        }
        recovered
    }

    /// §4.6 duty 3: deletes completed records older than
    /// `completedRetentionMs` (default 7 days).
    async fn prune_completed(&self) -> usize {
        let now = self.pipeline.clock().epoch_ms();
        let retention = self.pipeline.config().completed_retention_ms;

        self.pipeline
            .store()
            .mutate(|state| {
                let expired: Vec<IssueIdentifier> = state
                    .dispatches
                    .completed
                    .iter()
                    .filter(|(_, record)| now.saturating_sub(record.completed_at_ms) > retention)
                    .map(|(id, _)| id.clone())
                    .collect();
                for identifier in &expired {
                    state.dispatches.completed.shift_remove(identifier);
                }
                Ok::<_, Infallible>(expired.len())
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
