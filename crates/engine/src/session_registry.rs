// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local mirror of the store's `sessionMap`, kept for fast
//! in-process tool lookups (§9 Design Notes: "Global in-memory session
//! registry... Model as a narrow service with a lifecycle tied to process
//! start and `hydrateFromStore()` at boot; guard with an intra-process
//! mutex. Do not expose globals at the module level.").
//!
//! This is a read-through cache, not a source of truth — the persisted
//! `sessionMap` inside [`dispatch_core::DispatchState`] always wins on
//! disagreement. Callers that mutate the store are responsible for keeping
//! this registry in step via [`SessionRegistry::register`] /
//! [`SessionRegistry::remove`].

use dispatch_core::{DispatchState, IssueIdentifier, SessionKey, SessionMapping};
use indexmap::IndexMap;
use parking_lot::Mutex;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<IndexMap<SessionKey, SessionMapping>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the registry's contents with the store's current
    /// `sessionMap`. Call once at process start before serving lookups.
    pub fn hydrate_from_store(&self, state: &DispatchState) {
        *self.sessions.lock() = state.session_map.clone();
    }

    pub fn register(&self, key: SessionKey, mapping: SessionMapping) {
        self.sessions.lock().insert(key, mapping);
    }

    pub fn remove(&self, key: &SessionKey) -> Option<SessionMapping> {
        self.sessions.lock().shift_remove(key)
    }

    /// Removes every mapping for `dispatch_id`, across phase and attempt —
    /// the in-memory mirror of `dispatch_storage::ops`'s session-map purge
    /// on `complete`/`remove_active`. Call this wherever the store purges
    /// its own `sessionMap` for a dispatch, so the two never diverge.
    pub fn remove_for(&self, dispatch_id: &IssueIdentifier) {
        self.sessions.lock().retain(|_, mapping| &mapping.dispatch_id != dispatch_id);
    }

    pub fn lookup(&self, key: &SessionKey) -> Option<SessionMapping> {
        self.sessions.lock().get(key).cloned()
    }
}
