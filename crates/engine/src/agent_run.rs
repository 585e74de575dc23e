// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Run Wrapper (§4.4): uniformly executes one `AgentRunner` call,
//! feeding the watchdog ticks from the runner's streaming callbacks and
//! retrying exactly once on a watchdog kill.

use crate::watchdog::Watchdog;
use dispatch_core::{
    Activity, AgentResult, AgentRunner, Clock, IssueTracker, RunOptions, RunnerActivity,
    RunnerActivitySink, SessionKey, SystemClock, WatchdogConfig,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Wraps an [`AgentRunner`], adding the inactivity watchdog and
/// retry-once-on-kill policy described in §4.4.
pub struct AgentRunWrapper<R, C = SystemClock> {
    runner: Arc<R>,
    clock: C,
}

impl<R, C> AgentRunWrapper<R, C>
where
    R: AgentRunner + 'static,
    C: Clock,
{
    pub fn new(runner: Arc<R>, clock: C) -> Self {
        Self { runner, clock }
    }

    /// Up to two attempts: the initial run, plus one retry iff the failure
    /// cause was `watchdogKilled`. Non-watchdog failures are not retried.
    pub async fn run(
        &self,
        agent_id: &str,
        session_id: &SessionKey,
        message: &str,
        watchdog_config: WatchdogConfig,
        tracker: Option<Arc<dyn IssueTracker>>,
    ) -> AgentResult {
        let first = self
            .run_once(agent_id, session_id, message, watchdog_config, tracker.as_ref())
            .await;

        if !matches!(&first, AgentResult::Killed { .. }) {
            return first;
        }

        if let Some(tracker) = &tracker {
            let notice = tracker
                .emit_activity(
                    session_id,
                    Activity::Thought {
                        body: "watchdog fired; retrying run".into(),
                    },
                )
                .await;
            if let Err(err) = notice {
                warn!(%err, "failed to emit watchdog retry notice");
            }
        }

        self.run_once(agent_id, session_id, message, watchdog_config, tracker.as_ref())
            .await
    }

    async fn run_once(
        &self,
        agent_id: &str,
        session_id: &SessionKey,
        message: &str,
        watchdog_config: WatchdogConfig,
        tracker: Option<&Arc<dyn IssueTracker>>,
    ) -> AgentResult {
        let result = match tracker {
            Some(tracker) => self.run_streaming(agent_id, session_id, message, watchdog_config, tracker).await,
            None => {
                // No streaming sink: no tick source exists, so an inactivity
                // watchdog would fire spuriously on any run longer than
                // inactivityMs. The runner enforces the wall-clock bound
                // itself via `timeout_ms` (§4.4 "Fallback").
                let options = RunOptions {
                    timeout_ms: Some(watchdog_config.max_total_ms),
                    streaming: None,
                };
                self.runner.run(agent_id, session_id, message, options).await
            }
        };

        match result {
            Ok(agent_result) => agent_result,
            Err(err) => AgentResult::Failure {
                reason: err.to_string(),
                output: None,
            },
        }
    }

    async fn run_streaming(
        &self,
        agent_id: &str,
        session_id: &SessionKey,
        message: &str,
        watchdog_config: WatchdogConfig,
        tracker: &Arc<dyn IssueTracker>,
    ) -> Result<AgentResult, dispatch_core::RunnerError> {
        let runner_for_kill = self.runner.clone();
        let session_for_kill = session_id.clone();
        let watchdog = Watchdog::new(watchdog_config, self.clock.clone(), move |_reason| {
            let runner = runner_for_kill.clone();
            let session = session_for_kill.clone();
            tokio::spawn(async move { runner.abort(&session).await });
        });
        watchdog.start();

        let (tx, rx) = mpsc::unbounded_channel();
        let forward = tokio::spawn(forward_activities(rx, tracker.clone(), session_id.clone()));

        let sink: Arc<dyn RunnerActivitySink> = Arc::new(StreamSink {
            watchdog: watchdog.clone(),
            tx,
        });
        let options = RunOptions {
            timeout_ms: Some(watchdog_config.max_total_ms),
            streaming: Some(sink),
        };

        let result = self.runner.run(agent_id, session_id, message, options).await;
        watchdog.stop();
        let _ = forward.await;
        result
    }
}

struct StreamSink<C: Clock> {
    watchdog: Watchdog<C>,
    tx: mpsc::UnboundedSender<RunnerActivity>,
}

impl<C: Clock> RunnerActivitySink for StreamSink<C> {
    fn on_runner_activity(&self, activity: RunnerActivity) {
        self.watchdog.tick();
        let _ = self.tx.send(activity);
    }
}

async fn forward_activities(
    mut rx: mpsc::UnboundedReceiver<RunnerActivity>,
    tracker: Arc<dyn IssueTracker>,
    session_id: SessionKey,
) {
    while let Some(activity) = rx.recv().await {
        let Some(translated) = translate(activity) else {
            continue;
        };
        if let Err(err) = tracker.emit_activity(&session_id, translated).await {
            warn!(%err, "failed to emit runner activity");
        }
    }
}

/// Translates the four raw streaming classes into the tracker's `Activity`
/// shape (§4.4 "Streaming model"). `PartialReply` is tick-only and never
/// forwarded.
fn translate(activity: RunnerActivity) -> Option<Activity> {
    match activity {
        RunnerActivity::Reasoning(text) => {
            if text.chars().count() < 10 {
                None
            } else {
                Some(Activity::Thought {
                    body: truncate_chars(&text, 500),
                })
            }
        }
        RunnerActivity::ToolResult { tool, output } => Some(Activity::Action {
            action: tool,
            parameter: Some(truncate_chars(&output, 300)),
        }),
        RunnerActivity::ToolStart { tool, metadata } => Some(Activity::Action {
            action: tool,
            parameter: Some(truncate_chars(&metadata, 200)),
        }),
        RunnerActivity::PartialReply(_) => None,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
#[path = "agent_run_tests.rs"]
mod tests;
