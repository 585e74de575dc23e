// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dispatch-adapters: fake port implementations for tests and local
//! exercising of the pipeline, plus trivial real `Notifier`s.

pub mod notify;

#[cfg(any(test, feature = "test-support"))]
pub mod agent_runner;
#[cfg(any(test, feature = "test-support"))]
pub mod issue_tracker;
#[cfg(any(test, feature = "test-support"))]
pub mod prompt_builder;

pub use notify::{LoggingNotifier, NoopNotifier};

#[cfg(any(test, feature = "test-support"))]
pub use agent_runner::{FakeAgentRunner, RunCall, Scripted};
#[cfg(any(test, feature = "test-support"))]
pub use issue_tracker::{FakeIssueTracker, TrackerCall};
#[cfg(any(test, feature = "test-support"))]
pub use notify::fake::{FakeNotifier, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use prompt_builder::{FakePromptBuilder, RenderCall};
