// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline Orchestrator (§4.5): worker → audit → verdict → rework/stuck.
//! The audit phase is triggered exclusively by this component — never by
//! the worker agent's own output.

use crate::agent_run::AgentRunWrapper;
use crate::error::PipelineError;
use crate::session_registry::SessionRegistry;
use dispatch_core::{
    session_key_for, ActiveDispatchDraft, AgentResult, AgentRunner, Clock, CompletedStatus,
    DispatchStatus, EngineConfig, IssueContext, IssueTracker, Notifier, NotificationKind,
    NotificationPayload, PromptBuilder, PromptSection, PromptVars, SessionPhase, SystemClock,
    Verdict,
};
use dispatch_core::IssueIdentifier;
use dispatch_storage::{
    complete, patch_active, register, register_session, session_mapping, transition,
    CompleteRequest, FsStateWriter, LockedStore, StateWriter, TransitionPatch,
};
use std::sync::Arc;

/// Wires the store and the four external ports (§4.5) into the
/// worker/audit/verdict/rework state machine.
pub struct Pipeline<R, T, N, P, W = FsStateWriter, C = SystemClock>
where
    R: AgentRunner + 'static,
    T: IssueTracker + 'static,
    N: Notifier,
    P: PromptBuilder,
    W: StateWriter,
    C: Clock,
{
    store: Arc<LockedStore<W, C>>,
    tracker: Arc<T>,
    runner: AgentRunWrapper<R, C>,
    notifier: Arc<N>,
    prompts: Arc<P>,
    sessions: Arc<SessionRegistry>,
    config: EngineConfig,
    clock: C,
}

impl<R, T, N, P, W, C> Pipeline<R, T, N, P, W, C>
where
    R: AgentRunner + 'static,
    T: IssueTracker + 'static,
    N: Notifier,
    P: PromptBuilder,
    W: StateWriter,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<LockedStore<W, C>>,
        runner: Arc<R>,
        tracker: Arc<T>,
        notifier: Arc<N>,
        prompts: Arc<P>,
        sessions: Arc<SessionRegistry>,
        config: EngineConfig,
        clock: C,
    ) -> Self {
        Self {
            store,
            tracker,
            runner: AgentRunWrapper::new(runner, clock.clone()),
            notifier,
            prompts,
            sessions,
            config,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<LockedStore<W, C>> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn tracker(&self) -> &Arc<T> {
        &self.tracker
    }

    pub fn notifier(&self) -> &Arc<N> {
        &self.notifier
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Registers a brand-new dispatch and immediately starts Spawn Worker
    /// (§4.5.1).
    pub async fn dispatch(
        &self,
        draft: ActiveDispatchDraft,
        issue: IssueContext,
    ) -> Result<(), PipelineError> {
        let identifier = draft.issue_identifier.clone();
        let now = self.clock.epoch_ms();
        self.store.mutate(|state| register(state, draft, now))?;

        self.notifier
            .notify(
                NotificationKind::Dispatch,
                NotificationPayload {
                    identifier: identifier.clone(),
                    title: issue.title.clone(),
                    status: "dispatched".into(),
                    attempt: Some(0),
                    reason: None,
                    verdict: None,
                },
            )
            .await;

        self.spawn_worker(&identifier, &issue, None).await
    }

    /// §4.5.1 Spawn Worker. `gaps` is `Some` for a rework attempt, carrying
    /// the prior audit's gap list into the rework prompt.
    pub async fn spawn_worker(
        &self,
        identifier: &IssueIdentifier,
        issue: &IssueContext,
        gaps: Option<Vec<String>>,
    ) -> Result<(), PipelineError> {
        let state = self.store.read()?;
        let record = state
            .dispatches
            .active
            .get(identifier)
            .ok_or_else(|| PipelineError::DispatchNotFound(identifier.clone()))?
            .clone();
        let attempt = record.attempt;
        let worker_key = session_key_for(SessionPhase::Worker, identifier, attempt);

        if record.status == DispatchStatus::Dispatched {
            let mut patch = TransitionPatch::default();
            patch.worker_session_key = Some(Some(worker_key.clone()));
            self.store.mutate(|state| {
                transition(state, identifier, DispatchStatus::Dispatched, DispatchStatus::Working, patch)
            })?;
        } else {
            let key_for_patch = worker_key.clone();
            self.store.mutate(|state| {
                patch_active(state, identifier, |record| {
                    record.worker_session_key = Some(key_for_patch);
                });
                Ok::<(), std::convert::Infallible>(())
            })?;
        }

        let mapping = session_mapping(identifier.clone(), SessionPhase::Worker, attempt);
        let key_for_session = worker_key.clone();
        let mapping_for_session = mapping.clone();
        self.store.mutate(|state| {
            register_session(state, key_for_session, mapping_for_session);
            Ok::<(), std::convert::Infallible>(())
        })?;
        self.sessions.register(worker_key.clone(), mapping);

        self.notify(identifier, issue, NotificationKind::Working, "working", Some(attempt), None, None)
            .await;

        let vars = PromptVars {
            identifier: identifier.clone(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            worktree_path: record.worktree_path.clone(),
            tier: record.tier,
            attempt,
            gaps: gaps.clone(),
        };
        let section = if gaps.is_some() { PromptSection::Rework } else { PromptSection::Worker };
        let prompt = self.prompts.render(section, &vars);

        let tracker: Arc<dyn IssueTracker> = self.tracker.clone();
        let result = self
            .runner
            .run("worker", &worker_key, &prompt, self.config.watchdog, Some(tracker))
            .await;

        match result {
            AgentResult::Killed { .. } => {
                self.escalate(identifier, issue, DispatchStatus::Working, "watchdog_kill_2x")
                    .await
            }
            AgentResult::Failure { .. } => {
                self.escalate(identifier, issue, DispatchStatus::Working, "worker_failed")
                    .await
            }
            AgentResult::Success { .. } => self.trigger_audit(identifier, issue, attempt).await,
        }
    }

    /// §4.5.2 Trigger Audit.
    pub async fn trigger_audit(
        &self,
        identifier: &IssueIdentifier,
        issue: &IssueContext,
        attempt: u32,
    ) -> Result<(), PipelineError> {
        let event_key = format!("audit-trigger:{identifier}:{attempt}");
        let is_new = self
            .store
            .mutate(|state| Ok::<bool, std::convert::Infallible>(state.mark_event_processed(event_key.clone())))?;
        if !is_new {
            return Ok(());
        }

        let audit_key = session_key_for(SessionPhase::Audit, identifier, attempt);
        let mut patch = TransitionPatch::default();
        patch.audit_session_key = Some(Some(audit_key.clone()));
        self.store
            .mutate(|state| transition(state, identifier, DispatchStatus::Working, DispatchStatus::Auditing, patch))?;

        let mapping = session_mapping(identifier.clone(), SessionPhase::Audit, attempt);
        let key_for_session = audit_key.clone();
        let mapping_for_session = mapping.clone();
        self.store.mutate(|state| {
            register_session(state, key_for_session, mapping_for_session);
            Ok::<(), std::convert::Infallible>(())
        })?;
        self.sessions.register(audit_key.clone(), mapping);

        self.notify(identifier, issue, NotificationKind::Auditing, "auditing", Some(attempt), None, None)
            .await;

        let state = self.store.read()?;
        let record = state
            .dispatches
            .active
            .get(identifier)
            .ok_or_else(|| PipelineError::DispatchNotFound(identifier.clone()))?;
        let vars = PromptVars {
            identifier: identifier.clone(),
            title: issue.title.clone(),
            description: issue.description.clone(),
            worktree_path: record.worktree_path.clone(),
            tier: record.tier,
            attempt,
            gaps: None,
        };
        let prompt = self.prompts.render(PromptSection::Audit, &vars);

        let tracker: Arc<dyn IssueTracker> = self.tracker.clone();
        let result = self
            .runner
            .run("auditor", &audit_key, &prompt, self.config.watchdog, Some(tracker))
            .await;

        // §4.5.2 step 7: "on completion, deliver the output to Process
        // Verdict" unconditionally — unlike the worker phase, a killed or
        // failed auditor run has no separate escalation path of its own.
        // Feeding a non-JSON sentinel through the same `parse_verdict`
        // fallback as a malformed auditor reply keeps rework accounting
        // (`maxReworkAttempts`) in force for these outcomes too.
        let output = match result {
            AgentResult::Success { output } => output,
            AgentResult::Killed { .. } => "auditor run killed by watchdog after retry".to_string(),
            AgentResult::Failure { .. } => "auditor run failed".to_string(),
        };
        self.process_verdict(identifier, issue, attempt, &output).await
    }

    /// §4.5.3 Process Verdict.
    pub async fn process_verdict(
        &self,
        identifier: &IssueIdentifier,
        issue: &IssueContext,
        attempt: u32,
        auditor_output: &str,
    ) -> Result<(), PipelineError> {
        let event_key = format!("verdict:{identifier}:{attempt}");
        let is_new = self
            .store
            .mutate(|state| Ok::<bool, std::convert::Infallible>(state.mark_event_processed(event_key.clone())))?;
        if !is_new {
            return Ok(());
        }

        let verdict = parse_verdict(auditor_output);

        if verdict.pass {
            let now = self.clock.epoch_ms();
            self.store.mutate(|state| {
                transition(state, identifier, DispatchStatus::Auditing, DispatchStatus::Done, TransitionPatch::default())?;
                complete(
                    state,
                    identifier,
                    CompleteRequest {
                        status: CompletedStatus::Done,
                        completed_at_ms: now,
                        pr_url: None,
                    },
                )
            })?;
            self.sessions.remove_for(identifier);
            let _ = self
                .tracker
                .post_comment(&issue.id, &format!("Audit passed for {identifier}."))
                .await;
            self.notify(
                identifier,
                issue,
                NotificationKind::AuditPass,
                "done",
                Some(attempt),
                None,
                Some(verdict),
            )
            .await;
            return Ok(());
        }

        let next_attempt = attempt + 1;
        if next_attempt <= self.config.max_rework_attempts {
            let mut patch = TransitionPatch::default();
            patch.attempt = Some(next_attempt);
            patch.audit_session_key = Some(None);
            self.store
                .mutate(|state| transition(state, identifier, DispatchStatus::Auditing, DispatchStatus::Working, patch))?;

            self.notify(
                identifier,
                issue,
                NotificationKind::AuditFail,
                "working",
                Some(next_attempt),
                None,
                Some(verdict.clone()),
            )
            .await;

            return self.spawn_worker(identifier, issue, Some(verdict.gaps)).await;
        }

        self.escalate_with_verdict(identifier, issue, "audit_failed_max_attempts", verdict).await
    }

    /// Transitions `identifier` straight to `stuck` and emits the standard
    /// escalation comment + notification. Exposed beyond the orchestrator's
    /// own worker/audit failure paths so the hook adapter can reach it too.
    pub async fn escalate(
        &self,
        identifier: &IssueIdentifier,
        issue: &IssueContext,
        expected_from: DispatchStatus,
        reason: &str,
    ) -> Result<(), PipelineError> {
        let mut patch = TransitionPatch::default();
        patch.stuck_reason = Some(Some(reason.to_string()));
        self.store
            .mutate(|state| transition(state, identifier, expected_from, DispatchStatus::Stuck, patch))?;
        self.sessions.remove_for(identifier);

        let _ = self
            .tracker
            .post_comment(&issue.id, &format!("{identifier} escalated to stuck: {reason}"))
            .await;
        self.notify(identifier, issue, NotificationKind::Escalation, "stuck", None, Some(reason.to_string()), None)
            .await;
        Ok(())
    }

    async fn escalate_with_verdict(
        &self,
        identifier: &IssueIdentifier,
        issue: &IssueContext,
        reason: &str,
        verdict: Verdict,
    ) -> Result<(), PipelineError> {
        let mut patch = TransitionPatch::default();
        patch.stuck_reason = Some(Some(reason.to_string()));
        self.store
            .mutate(|state| transition(state, identifier, DispatchStatus::Auditing, DispatchStatus::Stuck, patch))?;
        self.sessions.remove_for(identifier);

        if self.config.complete_stuck_dispatches {
            let now = self.clock.epoch_ms();
            self.store.mutate(|state| {
                complete(
                    state,
                    identifier,
                    CompleteRequest {
                        status: CompletedStatus::Failed,
                        completed_at_ms: now,
                        pr_url: None,
                    },
                )
            })?;
        }

        let _ = self
            .tracker
            .post_comment(&issue.id, &format!("{identifier} escalated to stuck: {reason}"))
            .await;
        self.notify(identifier, issue, NotificationKind::Escalation, "stuck", None, Some(reason.to_string()), Some(verdict))
            .await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn notify(
        &self,
        identifier: &IssueIdentifier,
        issue: &IssueContext,
        kind: NotificationKind,
        status: &str,
        attempt: Option<u32>,
        reason: Option<String>,
        verdict: Option<Verdict>,
    ) {
        self.notifier
            .notify(
                kind,
                NotificationPayload {
                    identifier: identifier.clone(),
                    title: issue.title.clone(),
                    status: status.to_string(),
                    attempt,
                    reason,
                    verdict,
                },
            )
            .await;
    }
}

/// Locates the first top-level `{...}` object in `text` and parses it into
/// a [`Verdict`]; falls back to a failing verdict on any parse problem
/// (§4.5.3 step 2, §7 "Audit JSON parse failure").
fn parse_verdict(text: &str) -> Verdict {
    match extract_first_json_object(text).and_then(|obj| serde_json::from_str::<Verdict>(obj).ok()) {
        Some(verdict) => verdict,
        None => Verdict {
            pass: false,
            criteria: Vec::new(),
            gaps: vec!["audit output could not be parsed".to_string()],
            test_results: None,
        },
    }
}

fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
