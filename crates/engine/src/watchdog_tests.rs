// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dispatch_core::FakeClock;
use std::sync::atomic::{AtomicUsize, Ordering};

fn test_config(inactivity_ms: u64) -> WatchdogConfig {
    WatchdogConfig {
        inactivity_ms,
        max_total_ms: 60_000,
        tool_timeout_ms: 10_000,
    }
}

/// Advances both the fake domain clock and tokio's paused timer together —
/// the watchdog reads elapsed silence from the former but sleeps on the latter.
async fn advance(clock: &FakeClock, dur: Duration) {
    clock.advance(dur);
    tokio::time::advance(dur).await;
}

#[tokio::test(start_paused = true)]
async fn fires_after_sustained_silence() {
    let clock = FakeClock::new();
    let kills = Arc::new(AtomicUsize::new(0));
    let kills2 = kills.clone();
    let watchdog = Watchdog::new(test_config(1_000), clock.clone(), move |reason| {
        assert_eq!(reason, "inactivity");
        kills2.fetch_add(1, Ordering::SeqCst);
    });

    watchdog.start();
    advance(&clock, Duration::from_millis(1_100)).await;
    tokio::task::yield_now().await;

    assert!(watchdog.was_killed());
    assert_eq!(kills.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn tick_before_threshold_prevents_fire() {
    let clock = FakeClock::new();
    let kills = Arc::new(AtomicUsize::new(0));
    let kills2 = kills.clone();
    let watchdog = Watchdog::new(test_config(1_000), clock.clone(), move |_| {
        kills2.fetch_add(1, Ordering::SeqCst);
    });

    watchdog.start();
    advance(&clock, Duration::from_millis(600)).await;
    watchdog.tick();
    advance(&clock, Duration::from_millis(600)).await;
    tokio::task::yield_now().await;

    assert!(!watchdog.was_killed(), "tick should have postponed the fire");
    assert_eq!(kills.load(Ordering::SeqCst), 0);

    advance(&clock, Duration::from_millis(500)).await;
    tokio::task::yield_now().await;

    assert!(watchdog.was_killed());
    assert_eq!(kills.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_the_pending_check() {
    let clock = FakeClock::new();
    let kills = Arc::new(AtomicUsize::new(0));
    let kills2 = kills.clone();
    let watchdog = Watchdog::new(test_config(1_000), clock.clone(), move |_| {
        kills2.fetch_add(1, Ordering::SeqCst);
    });

    watchdog.start();
    watchdog.stop();
    advance(&clock, Duration::from_millis(5_000)).await;
    tokio::task::yield_now().await;

    assert!(!watchdog.was_killed());
    assert_eq!(kills.load(Ordering::SeqCst), 0);

    watchdog.tick();
    assert!(!watchdog.was_killed());
}

#[tokio::test(start_paused = true)]
async fn on_kill_fires_at_most_once() {
    let clock = FakeClock::new();
    let kills = Arc::new(AtomicUsize::new(0));
    let kills2 = kills.clone();
    let watchdog = Watchdog::new(test_config(1_000), clock.clone(), move |_| {
        kills2.fetch_add(1, Ordering::SeqCst);
    });

    watchdog.start();
    advance(&clock, Duration::from_millis(5_000)).await;
    tokio::task::yield_now().await;
    watchdog.start();
    advance(&clock, Duration::from_millis(5_000)).await;
    tokio::task::yield_now().await;

    assert_eq!(kills.load(Ordering::SeqCst), 1);
}
