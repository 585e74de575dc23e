// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the pipeline orchestrator and background monitor.

use dispatch_core::{IssueIdentifier, RegisterError, StoreError, TransitionError};
use dispatch_storage::MutateError;
use std::convert::Infallible;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("dispatch {0} not found")]
    DispatchNotFound(IssueIdentifier),
}

/// `mutate` closures that can't fail use `Result<T, Infallible>` — there is
/// no blanket `Infallible: Into<StoreError>` in std, so each abort type the
/// pipeline's closures actually use gets its own conversion.
impl From<MutateError<Infallible>> for PipelineError {
    fn from(err: MutateError<Infallible>) -> Self {
        match err {
            MutateError::Store(store) => PipelineError::Store(store),
            MutateError::Aborted(never) => match never {},
        }
    }
}

impl From<MutateError<TransitionError>> for PipelineError {
    fn from(err: MutateError<TransitionError>) -> Self {
        match err {
            MutateError::Store(store) => PipelineError::Store(store),
            MutateError::Aborted(transition) => PipelineError::Store(StoreError::Transition(transition)),
        }
    }
}

impl From<MutateError<RegisterError>> for PipelineError {
    fn from(err: MutateError<RegisterError>) -> Self {
        match err {
            MutateError::Store(store) => PipelineError::Store(store),
            MutateError::Aborted(register) => PipelineError::Store(StoreError::Register(register)),
        }
    }
}
