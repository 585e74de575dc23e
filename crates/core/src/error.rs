// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by the storage and engine crates (§6, §7).
//!
//! Contract errors ([`TransitionError`], [`RegisterError`]) are surfaced to
//! the caller and never retried. [`StoreLockError`] and [`StoreCorruptError`]
//! are the two failure modes the locked store can hit; the store itself
//! retries transient lock contention internally before returning either.

use crate::ids::IssueIdentifier;
use crate::model::DispatchStatus;
use thiserror::Error;

/// A CAS transition was attempted against a record that didn't match the
/// expected source status, or the `(from, to)` edge is outside the §4.2
/// graph. Includes enough context for the caller to log without re-reading
/// the store.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("transition failed for {identifier}: expected {expected}, actual {actual:?}, target {target}")]
pub struct TransitionError {
    pub identifier: IssueIdentifier,
    pub expected: DispatchStatus,
    /// `None` when the record was missing entirely.
    pub actual: Option<DispatchStatus>,
    pub target: DispatchStatus,
}

/// `register` was called for an identifier already present in `active`.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("dispatch already active: {0}")]
pub struct RegisterError(pub IssueIdentifier);

/// The store's advisory lock could not be acquired within the acquisition
/// deadline, even after stale-lock recovery (§4.1).
#[derive(Debug, Error, Clone, PartialEq)]
#[error("could not acquire store lock within deadline")]
pub struct StoreLockError;

/// The state file exists but failed to parse, or contains a status string
/// the core does not recognize as a legacy alias (§9 Open Questions).
#[derive(Debug, Error)]
pub enum StoreCorruptError {
    #[error("state file is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("unrecognized dispatch status {status:?} for {identifier}")]
    UnknownStatus { identifier: String, status: String },
}

/// Top-level error surfaced by the locked store's public operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Lock(#[from] StoreLockError),
    #[error(transparent)]
    Corrupt(#[from] StoreCorruptError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
