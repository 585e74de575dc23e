// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AgentRunner` fake. The real backends (three coding-CLI subprocess
//! runners plus an in-process agent runner) are deliberately out of scope
//! (§1); this lets pipeline/watchdog tests script exact runner behavior.

#![cfg(any(test, feature = "test-support"))]

use async_trait::async_trait;
use dispatch_core::{AgentResult, AgentRunner, RunOptions, RunnerActivity, RunnerError, SessionKey};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RunCall {
    pub agent_id: String,
    pub session_id: SessionKey,
    pub message: String,
}

/// Scripted outcome for one [`AgentRunner::run`] call.
#[derive(Clone)]
pub enum Scripted {
    Result(AgentResult),
    /// Emit this sequence of [`RunnerActivity`] through the caller-supplied
    /// sink before returning `then`.
    Stream {
        activities: Vec<RunnerActivity>,
        then: Box<AgentResult>,
    },
}

impl Scripted {
    pub fn success(output: impl Into<String>) -> Self {
        Scripted::Result(AgentResult::Success { output: output.into() })
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Scripted::Result(AgentResult::Failure {
            reason: reason.into(),
            output: None,
        })
    }

    pub fn killed(silence_ms: u64) -> Self {
        Scripted::Result(AgentResult::Killed {
            silence_ms,
            output: None,
        })
    }
}

/// Fake `AgentRunner` driven by a FIFO queue of [`Scripted`] outcomes, one
/// per call to `run`. Panics (test-only) if the queue runs dry — a test
/// that under-scripts its runner has a bug, not a case to handle gracefully.
#[derive(Clone, Default)]
pub struct FakeAgentRunner {
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<RunCall>>>,
    aborted: Arc<Mutex<Vec<SessionKey>>>,
}

impl FakeAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: Scripted) -> &Self {
        self.queue.lock().push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<RunCall> {
        self.calls.lock().clone()
    }

    pub fn aborted_sessions(&self) -> Vec<SessionKey> {
        self.aborted.lock().clone()
    }
}

#[async_trait]
impl AgentRunner for FakeAgentRunner {
    async fn run(
        &self,
        agent_id: &str,
        session_id: &SessionKey,
        message: &str,
        options: RunOptions,
    ) -> Result<AgentResult, RunnerError> {
        self.calls.lock().push(RunCall {
            agent_id: agent_id.to_string(),
            session_id: session_id.clone(),
            message: message.to_string(),
        });

        let scripted = self
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| panic!("FakeAgentRunner queue exhausted for {session_id}"));

        match scripted {
            Scripted::Result(result) => Ok(result),
            Scripted::Stream { activities, then } => {
                if let Some(sink) = &options.streaming {
                    for activity in activities {
                        sink.on_runner_activity(activity);
                    }
                }
                Ok(*then)
            }
        }
    }

    async fn abort(&self, session_id: &SessionKey) {
        self.aborted.lock().push(session_id.clone());
    }
}
