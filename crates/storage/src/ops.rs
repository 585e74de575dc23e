// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure CAS transition primitives over [`DispatchState`] (§4.2).
//!
//! Each function here is a state transformer; none of them touch the
//! filesystem. [`crate::locked_store::LockedStore`] is what composes them
//! with the lock + atomic write.

use dispatch_core::{
    ActiveDispatch, ActiveDispatchDraft, CompletedStatus, DispatchState, DispatchStatus,
    IssueIdentifier, RegisterError, SessionKey, SessionMapping, SessionPhase, TransitionError,
};

/// A field-level patch bundled into a [`transition`] call (§4.2).
#[derive(Debug, Clone, Default)]
pub struct TransitionPatch {
    pub attempt: Option<u32>,
    pub stuck_reason: Option<Option<String>>,
    pub worker_session_key: Option<Option<SessionKey>>,
    pub audit_session_key: Option<Option<SessionKey>>,
    pub agent_session_id: Option<Option<dispatch_core::AgentSessionId>>,
}

/// Fields accepted by [`complete`].
#[derive(Debug, Clone)]
pub struct CompleteRequest {
    pub status: CompletedStatus,
    pub completed_at_ms: u64,
    pub pr_url: Option<String>,
}

/// `register(identifier, dispatch)` — fails if `active[identifier]` exists.
pub fn register(
    state: &mut DispatchState,
    draft: ActiveDispatchDraft,
    now_ms: u64,
) -> Result<(), RegisterError> {
    let identifier = draft.issue_identifier.clone();
    if state.dispatches.active.contains_key(&identifier) {
        return Err(RegisterError(identifier));
    }
    state
        .dispatches
        .active
        .insert(identifier, draft.into_active(now_ms));
    Ok(())
}

/// `transition(identifier, expectedFrom, to, patch?)` — CAS.
pub fn transition(
    state: &mut DispatchState,
    identifier: &IssueIdentifier,
    expected_from: DispatchStatus,
    to: DispatchStatus,
    patch: TransitionPatch,
) -> Result<(), TransitionError> {
    let record = state.dispatches.active.get_mut(identifier);
    let actual = record.as_ref().map(|r| r.status);

    let legal = expected_from.can_transition_to(to)
        || (to == DispatchStatus::Stuck && expected_from.can_escalate_to_stuck());

    if actual != Some(expected_from) || !legal {
        return Err(TransitionError {
            identifier: identifier.clone(),
            expected: expected_from,
            actual,
            target: to,
        });
    }

    let record = record.expect("presence checked above");
    record.status = to;
    if let Some(attempt) = patch.attempt {
        record.attempt = attempt;
    }
    if let Some(reason) = patch.stuck_reason {
        record.stuck_reason = reason;
    }
    if let Some(key) = patch.worker_session_key {
        record.worker_session_key = key;
    }
    if let Some(key) = patch.audit_session_key {
        record.audit_session_key = key;
    }
    if let Some(id) = patch.agent_session_id {
        record.agent_session_id = id;
    }
    Ok(())
}

/// `complete(identifier, {status, completedAt, prUrl?})` — moves `active` ->
/// `completed`, purging session-map entries for the dispatch.
pub fn complete(
    state: &mut DispatchState,
    identifier: &IssueIdentifier,
    request: CompleteRequest,
) -> Result<(), TransitionError> {
    let Some(record) = state.dispatches.active.shift_remove(identifier) else {
        return Err(TransitionError {
            identifier: identifier.clone(),
            expected: DispatchStatus::Done,
            actual: None,
            target: DispatchStatus::Done,
        });
    };

    purge_sessions_for(state, identifier);

    state.dispatches.completed.insert(
        identifier.clone(),
        dispatch_core::CompletedDispatch {
            issue_identifier: identifier.clone(),
            tier: record.tier,
            status: request.status,
            completed_at_ms: request.completed_at_ms,
            total_attempts: record.attempt + 1,
            pr_url: request.pr_url,
            project: record.project,
        },
    );
    Ok(())
}

/// Direct, non-CAS field mutation for a record already in the caller's
/// expected status. Used by the pipeline's rework path, where the status
/// transition into `working` already happened as part of the `auditing ->
/// working` CAS in Process Verdict and only the worker session key still
/// needs setting — there is no legal `working -> working` edge to CAS
/// through.
pub fn patch_active(
    state: &mut DispatchState,
    identifier: &IssueIdentifier,
    f: impl FnOnce(&mut ActiveDispatch),
) -> bool {
    match state.dispatches.active.get_mut(identifier) {
        Some(record) => {
            f(record);
            true
        }
        None => false,
    }
}

/// `updateStatus(identifier, status)` — weak non-CAS setter for out-of-band
/// repair only; the pipeline must never call this (§4.2).
pub fn update_status(
    state: &mut DispatchState,
    identifier: &IssueIdentifier,
    status: DispatchStatus,
) -> bool {
    match state.dispatches.active.get_mut(identifier) {
        Some(record) => {
            record.status = status;
            true
        }
        None => false,
    }
}

/// `removeActive(identifier)` — drops a record and its session mappings
/// without completing it (used by retry and cancel).
pub fn remove_active(state: &mut DispatchState, identifier: &IssueIdentifier) -> Option<ActiveDispatch> {
    let removed = state.dispatches.active.shift_remove(identifier);
    if removed.is_some() {
        purge_sessions_for(state, identifier);
    }
    removed
}

fn purge_sessions_for(state: &mut DispatchState, identifier: &IssueIdentifier) {
    state
        .session_map
        .retain(|_, mapping| &mapping.dispatch_id != identifier);
}

/// `registerSession(sessionKey, mapping)`.
pub fn register_session(state: &mut DispatchState, session_key: SessionKey, mapping: SessionMapping) {
    state.session_map.insert(session_key, mapping);
}

/// `removeSession(sessionKey)`.
pub fn remove_session(state: &mut DispatchState, session_key: &SessionKey) -> Option<SessionMapping> {
    state.session_map.shift_remove(session_key)
}

/// Convenience used by the pipeline's rework path to build a fresh session
/// mapping without hand-assembling the struct at every call site.
pub fn session_mapping(dispatch_id: IssueIdentifier, phase: SessionPhase, attempt: u32) -> SessionMapping {
    SessionMapping { dispatch_id, phase, attempt }
}

#[cfg(test)]
#[path = "ops_tests.rs"]
mod tests;
