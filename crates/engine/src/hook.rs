// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook Adapter (§4.7): translates an agent-runner completion callback
//! into a Trigger Audit or Process Verdict call against the pipeline.

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use dispatch_core::{
    AgentRunner, Clock, DispatchStatus, IssueTracker, Notifier, PromptBuilder, SessionKey,
    SessionPhase, SystemClock,
};
use dispatch_storage::{FsStateWriter, StateWriter};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct HookAdapter<R, T, N, P, W = FsStateWriter, C = SystemClock>
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

impl<R, T, N, P, W, C> HookAdapter<R, T, N, P, W, C>
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

    /// §4.7: called when a worker or auditor session the runner owns
    /// finishes, dispatching unconditionally by phase (worker -> Trigger
    /// Audit, audit -> Process Verdict) per step 4. `success` is part of
    /// the callback's own contract, not a §4.7 branch: a failed worker run
    /// still escalates directly, matching the orchestrator's own
    /// `Killed`/`Failure` handling for that phase (§4.5.1, which has no
    /// artifact to audit on worker failure); a failed audit run instead
    /// flows into Process Verdict with a failing sentinel, matching how
    /// `trigger_audit` itself now handles a killed or failed auditor run
    /// (§4.5.2 step 7's unconditional "deliver to Process Verdict").
    pub async fn on_agent_finished(
        &self,
        session_key: &SessionKey,
        output: &str,
        success: bool,
    ) -> Result<(), PipelineError> {
        let mapping = match self.pipeline.sessions().lookup(session_key) {
            Some(mapping) => mapping,
            None => {
                debug!(%session_key, "hook: no session mapping, ignoring");
                return Ok(());
            }
        };

        let state = self.pipeline.store().read()?;
        let record = match state.dispatches.active.get(&mapping.dispatch_id) {
            Some(record) => record.clone(),
            None => {
                debug!(%session_key, dispatch = %mapping.dispatch_id, "hook: dispatch no longer active, ignoring");
                return Ok(());
            }
        };
        drop(state);

        if record.attempt != mapping.attempt {
            debug!(
                %session_key,
                dispatch = %mapping.dispatch_id,
                mapping_attempt = mapping.attempt,
                record_attempt = record.attempt,
                "hook: stale event from a superseded attempt, ignoring"
            );
            return Ok(());
        }

        let issue = self.pipeline.tracker().fetch_issue(&record.issue_id).await.map_err(|err| {
            warn!(%err, dispatch = %mapping.dispatch_id, "hook: failed to fetch issue");
            PipelineError::DispatchNotFound(mapping.dispatch_id.clone())
        })?;

        match mapping.phase {
            SessionPhase::Worker => {
                if !success {
                    return self
                        .pipeline
                        .escalate(&mapping.dispatch_id, &issue, DispatchStatus::Working, "worker_failed")
                        .await;
                }
                self.pipeline.trigger_audit(&mapping.dispatch_id, &issue, mapping.attempt).await
            }
            SessionPhase::Audit => {
                let verdict_input = if success { output } else { "auditor run failed" };
                self.pipeline
                    .process_verdict(&mapping.dispatch_id, &issue, mapping.attempt, verdict_input)
                    .await
            }
        }
    }
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
