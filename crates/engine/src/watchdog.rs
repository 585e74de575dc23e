// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inactivity watchdog (§4.3): an idempotent timer around a long-running
//! agent run that fires `onKill` at most once after sustained silence.

use dispatch_core::{Clock, SystemClock, WatchdogConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

struct Inner {
    inactivity_ms: u64,
    last_activity_at_ms: u64,
    was_killed: bool,
    stopped: bool,
}

struct Shared<C: Clock> {
    inner: Mutex<Inner>,
    clock: C,
    on_kill: Arc<dyn Fn(&str) + Send + Sync>,
}

/// Per-run inactivity timer (§4.3). Cloning shares the same underlying
/// state and check task.
#[derive(Clone)]
pub struct Watchdog<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<C: Clock> Watchdog<C> {
    pub fn new(config: WatchdogConfig, clock: C, on_kill: impl Fn(&str) + Send + Sync + 'static) -> Self {
        let now = clock.epoch_ms();
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    inactivity_ms: config.inactivity_ms,
                    last_activity_at_ms: now,
                    was_killed: false,
                    stopped: true,
                }),
                clock,
                on_kill: Arc::new(on_kill),
            }),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Idempotent: records `lastActivityAt = now` and ensures exactly one
    /// check loop is running. A watchdog already killed stays killed —
    /// `onKill` fires at most once per instance even across `start()` calls.
    pub fn start(&self) {
        {
            let mut inner = self.shared.inner.lock();
            inner.last_activity_at_ms = self.shared.clock.epoch_ms();
            inner.stopped = false;
        }
        self.ensure_check_loop_running();
    }

    /// Sets `lastActivityAt = now`; never resets the pending check directly.
    /// A no-op after `stop()` or once killed.
    pub fn tick(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.stopped || inner.was_killed {
            return;
        }
        inner.last_activity_at_ms = self.shared.clock.epoch_ms();
    }

    /// Cancels the pending check. Subsequent `tick()` is a no-op until
    /// `start()` re-arms the watchdog.
    pub fn stop(&self) {
        self.shared.inner.lock().stopped = true;
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    pub fn was_killed(&self) -> bool {
        self.shared.inner.lock().was_killed
    }

    pub fn silence_ms(&self) -> u64 {
        let inner = self.shared.inner.lock();
        self.shared
            .clock
            .epoch_ms()
            .saturating_sub(inner.last_activity_at_ms)
    }

    fn ensure_check_loop_running(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let shared = self.shared.clone();
        *task = Some(tokio::spawn(run_check_loop(shared)));
    }
}

async fn run_check_loop<C: Clock>(shared: Arc<Shared<C>>) {
    let mut wait_ms = { shared.inner.lock().inactivity_ms };
    loop {
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;

        let mut inner = shared.inner.lock();
        if inner.stopped || inner.was_killed {
            return;
        }
        let now = shared.clock.epoch_ms();
        let silence = now.saturating_sub(inner.last_activity_at_ms);
        if silence >= inner.inactivity_ms {
            inner.was_killed = true;
            drop(inner);
            invoke_on_kill(&shared.on_kill, "inactivity");
            return;
        }
        wait_ms = (inner.inactivity_ms - silence).max(1_000);
    }
}

/// Catches a panicking callback so it never propagates out of the watchdog
/// task (§4.3: "swallow any error synchronously and asynchronously, never
/// re-throw").
fn invoke_on_kill(on_kill: &Arc<dyn Fn(&str) + Send + Sync>, reason: &str) {
    let on_kill = on_kill.clone();
    let reason = reason.to_string();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| on_kill(&reason)));
    if result.is_err() {
        warn!("watchdog onKill callback panicked; swallowed");
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
