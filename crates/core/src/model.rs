// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatch data model (`DispatchState` and its entities).
//!
//! This is a pure data value: no I/O, no locking. [`crate::ports`] and
//! `dispatch-storage` build the behavior around it.

use crate::ids::{AgentSessionId, IssueId, IssueIdentifier, SessionKey};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bound on the processed-event FIFO (§3 `ProcessedEvents`).
pub const PROCESSED_EVENTS_CAPACITY: usize = 200;

/// Externally-chosen complexity label, carried for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Junior,
    Medior,
    Senior,
}

crate::simple_display! {
    Tier {
        Junior => "junior",
        Medior => "medior",
        Senior => "senior",
    }
}

/// A dispatch's position in the state machine (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Dispatched,
    Working,
    Auditing,
    Done,
    Failed,
    Stuck,
}

crate::simple_display! {
    DispatchStatus {
        Dispatched => "dispatched",
        Working => "working",
        Auditing => "auditing",
        Done => "done",
        Failed => "failed",
        Stuck => "stuck",
    }
}

impl DispatchStatus {
    /// Whether `self -> to` is a legal edge in the §4.2 transition graph,
    /// ignoring the explicit any-non-terminal-to-stuck escalation edge
    /// (callers that want that edge included should use
    /// [`DispatchStatus::can_escalate_to_stuck`] in addition).
    pub fn can_transition_to(self, to: DispatchStatus) -> bool {
        use DispatchStatus::*;
        matches!(
            (self, to),
            (Dispatched, Working)
                | (Working, Auditing)
                | (Auditing, Done)
                | (Auditing, Working)
                | (Working, Stuck)
                | (Auditing, Stuck)
        )
    }

    /// Any non-terminal status may be escalated directly to `stuck`.
    pub fn can_escalate_to_stuck(self) -> bool {
        !matches!(self, DispatchStatus::Done | DispatchStatus::Failed | DispatchStatus::Stuck)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchStatus::Done | DispatchStatus::Failed | DispatchStatus::Stuck)
    }
}

/// Which agent run a [`SessionMapping`] resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Worker,
    Audit,
}

crate::simple_display! {
    SessionPhase {
        Worker => "worker",
        Audit => "audit",
    }
}

/// One issue currently in flight (§3 `ActiveDispatch`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDispatch {
    pub issue_id: IssueId,
    pub issue_identifier: IssueIdentifier,
    pub branch: String,
    /// Opaque workspace pointer; may encode a single path or a multi-repo mapping.
    pub worktree_path: String,
    pub tier: Tier,
    /// Display-only model name, never interpreted by the core.
    pub model: String,
    pub status: DispatchStatus,
    pub attempt: u32,
    pub dispatched_at_ms: u64,
    pub stuck_reason: Option<String>,
    pub worker_session_key: Option<SessionKey>,
    pub audit_session_key: Option<SessionKey>,
    pub agent_session_id: Option<AgentSessionId>,
    pub project: Option<String>,
}

/// Draft supplied by a caller registering a new dispatch; defaults for
/// `status`/`attempt`/`dispatched_at_ms` are filled in by `register`.
#[derive(Debug, Clone)]
pub struct ActiveDispatchDraft {
    pub issue_id: IssueId,
    pub issue_identifier: IssueIdentifier,
    pub branch: String,
    pub worktree_path: String,
    pub tier: Tier,
    pub model: String,
    pub project: Option<String>,
}

impl ActiveDispatchDraft {
    pub(crate) fn into_active(self, dispatched_at_ms: u64) -> ActiveDispatch {
        ActiveDispatch {
            issue_id: self.issue_id,
            issue_identifier: self.issue_identifier,
            branch: self.branch,
            worktree_path: self.worktree_path,
            tier: self.tier,
            model: self.model,
            status: DispatchStatus::Dispatched,
            attempt: 0,
            dispatched_at_ms,
            stuck_reason: None,
            worker_session_key: None,
            audit_session_key: None,
            agent_session_id: None,
            project: self.project,
        }
    }
}

/// Terminal status recorded for a dispatch (§3 `CompletedDispatch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletedStatus {
    Done,
    Failed,
}

/// Snapshot moved from `active` to `completed` on terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedDispatch {
    pub issue_identifier: IssueIdentifier,
    pub tier: Tier,
    pub status: CompletedStatus,
    pub completed_at_ms: u64,
    pub total_attempts: u32,
    pub pr_url: Option<String>,
    pub project: Option<String>,
}

/// `sessionKey -> {dispatchId, phase, attempt}` (§3 `SessionMapping`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMapping {
    pub dispatch_id: IssueIdentifier,
    pub phase: SessionPhase,
    pub attempt: u32,
}

/// The top-level persisted document (§3 `DispatchState`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchState {
    pub dispatches: Dispatches,
    pub session_map: IndexMap<SessionKey, SessionMapping>,
    pub processed_events: VecDeque<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dispatches {
    pub active: IndexMap<IssueIdentifier, ActiveDispatch>,
    pub completed: IndexMap<IssueIdentifier, CompletedDispatch>,
}

impl DispatchState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// I4: `processedEvents` never exceeds [`PROCESSED_EVENTS_CAPACITY`];
    /// oldest evicted first. Returns whether `event_key` was newly inserted.
    pub fn mark_event_processed(&mut self, event_key: impl Into<String>) -> bool {
        let event_key = event_key.into();
        if self.processed_events.iter().any(|e| *e == event_key) {
            return false;
        }
        self.processed_events.push_back(event_key);
        while self.processed_events.len() > PROCESSED_EVENTS_CAPACITY {
            self.processed_events.pop_front();
        }
        true
    }

    pub fn lookup_session(&self, key: &SessionKey) -> Option<&SessionMapping> {
        self.session_map.get(key)
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
