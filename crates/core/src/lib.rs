// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dispatch-core: data model, ports, and error taxonomy for the dispatch
//! engine — the orchestration layer of an issue-tracker-driven coding
//! assistant (§1 Purpose & Scope).

pub mod macros;

pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod ports;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{EngineConfig, StoreConfig, WatchdogConfig};
pub use error::{RegisterError, StoreCorruptError, StoreError, StoreLockError, TransitionError};
pub use ids::{AgentSessionId, IssueId, IssueIdentifier, SessionKey};
pub use model::{
    ActiveDispatch, ActiveDispatchDraft, CompletedDispatch, CompletedStatus, DispatchState,
    Dispatches, DispatchStatus, SessionMapping, SessionPhase, Tier, PROCESSED_EVENTS_CAPACITY,
};
pub use ports::{
    session_key_for, Activity, AgentResult, AgentRunner, IssueContext, IssueTracker,
    NotificationKind, NotificationPayload, Notifier, PromptBuilder, PromptSection, PromptVars,
    RunOptions, RunnerActivity, RunnerActivitySink, RunnerError, TrackerError, Verdict,
};
