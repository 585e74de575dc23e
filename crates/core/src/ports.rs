// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External collaborator traits (§6) and the agent-run result shape (§9).
//!
//! These are the seams the pipeline orchestrator depends on. Real
//! implementations (HTTP trackers, subprocess runners, chat notifiers) live
//! outside this workspace; `dispatch-adapters` carries fakes for tests and
//! a couple of trivial real `Notifier`s.

use crate::ids::{IssueId, IssueIdentifier, SessionKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An issue as fetched from the tracker (§6 `fetchIssue`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueContext {
    pub id: IssueId,
    pub identifier: IssueIdentifier,
    pub title: String,
    pub description: String,
    /// Preview of recent comments, most recent last.
    pub comments: Vec<String>,
}

/// A single streamed activity emitted to the tracker while an agent runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Activity {
    /// A "thought" activity: reasoning chunks >= 10 chars, trimmed to 500.
    Thought { body: String },
    /// An "action" activity: tool-result or tool-start, with truncated detail.
    Action {
        action: String,
        parameter: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch_issue(&self, issue_id: &IssueId) -> Result<IssueContext, TrackerError>;
    async fn post_comment(&self, issue_id: &IssueId, markdown: &str) -> Result<(), TrackerError>;
    async fn emit_activity(
        &self,
        session_id: &SessionKey,
        activity: Activity,
    ) -> Result<(), TrackerError>;
}

/// The four streamed activity classes a runner may emit mid-run (§4.4
/// "Streaming model"). `Killed`/`tick`-only translation happens in the
/// wrapper, not here — this is the raw signal from the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerActivity {
    /// Reasoning chunk; only chunks >= 10 chars become a "thought" activity.
    Reasoning(String),
    ToolResult { tool: String, output: String },
    ToolStart { tool: String, metadata: String },
    /// Tick-only: never forwarded to the tracker.
    PartialReply(String),
}

/// Sink the runner streams [`RunnerActivity`] into. The agent run wrapper
/// implements this to translate each event into a `watchdog.tick()` plus,
/// for everything except `PartialReply`, a single tracker emission (§4.4).
pub trait RunnerActivitySink: Send + Sync {
    fn on_runner_activity(&self, activity: RunnerActivity);
}

/// Options accepted by [`AgentRunner::run`].
#[derive(Clone, Default)]
pub struct RunOptions {
    pub timeout_ms: Option<u64>,
    /// `Some` iff the runner supports mid-run streaming; `None` triggers
    /// the "fallback" subprocess path described in §4.4 (no mid-run ticks,
    /// aggregated JSON output only).
    pub streaming: Option<Arc<dyn RunnerActivitySink>>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("timeout_ms", &self.timeout_ms)
            .field("streaming", &self.streaming.is_some())
            .finish()
    }
}

/// The tagged variant replacing the original's "any-typed" runner payload
/// (§9 Design Notes).
#[derive(Debug, Clone, PartialEq)]
pub enum AgentResult {
    Success {
        output: String,
    },
    Failure {
        reason: String,
        output: Option<String>,
    },
    Killed {
        silence_ms: u64,
        output: Option<String>,
    },
}

impl AgentResult {
    pub fn output(&self) -> Option<&str> {
        match self {
            AgentResult::Success { output } => Some(output),
            AgentResult::Failure { output, .. } | AgentResult::Killed { output, .. } => {
                output.as_deref()
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AgentResult::Success { .. })
    }

    pub fn is_watchdog_killed(&self) -> bool {
        matches!(self, AgentResult::Killed { .. })
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("agent runner failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        agent_id: &str,
        session_id: &SessionKey,
        message: &str,
        options: RunOptions,
    ) -> Result<AgentResult, RunnerError>;

    async fn abort(&self, session_id: &SessionKey);
}

/// Notification kinds (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Dispatch,
    Working,
    Auditing,
    AuditPass,
    AuditFail,
    Escalation,
    Stuck,
    WatchdogKill,
}

crate::simple_display! {
    NotificationKind {
        Dispatch => "dispatch",
        Working => "working",
        Auditing => "auditing",
        AuditPass => "audit_pass",
        AuditFail => "audit_fail",
        Escalation => "escalation",
        Stuck => "stuck",
        WatchdogKill => "watchdog_kill",
    }
}

/// The auditor's parsed verdict (§4.5.2 step 5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub pass: bool,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    pub test_results: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub identifier: IssueIdentifier,
    pub title: String,
    pub status: String,
    pub attempt: Option<u32>,
    pub reason: Option<String>,
    pub verdict: Option<Verdict>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: NotificationKind, payload: NotificationPayload);
}

/// Prompt sections the core asks a [`PromptBuilder`] to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSection {
    Worker,
    Audit,
    Rework,
}

crate::simple_display! {
    PromptSection {
        Worker => "worker",
        Audit => "audit",
        Rework => "rework",
    }
}

/// Variables the core supplies to a [`PromptBuilder`] (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct PromptVars {
    pub identifier: IssueIdentifier,
    pub title: String,
    pub description: String,
    pub worktree_path: String,
    pub tier: crate::model::Tier,
    pub attempt: u32,
    pub gaps: Option<Vec<String>>,
}

pub trait PromptBuilder: Send + Sync {
    fn render(&self, section: PromptSection, vars: &PromptVars) -> String;
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Thought { body } => write!(f, "thought: {body}"),
            Activity::Action { action, parameter } => {
                write!(f, "action: {action}")?;
                if let Some(p) = parameter {
                    write!(f, " ({p})")?;
                }
                Ok(())
            }
        }
    }
}

/// Derive the worker or audit session key for `(identifier, attempt)`,
/// matching the naming convention in §4.5.1/§4.5.2.
pub fn session_key_for(phase: crate::model::SessionPhase, identifier: &IssueIdentifier, attempt: u32) -> SessionKey {
    match phase {
        crate::model::SessionPhase::Worker => {
            SessionKey::new(format!("linear-worker-{identifier}-{attempt}"))
        }
        crate::model::SessionPhase::Audit => {
            SessionKey::new(format!("linear-audit-{identifier}-{attempt}"))
        }
    }
}
