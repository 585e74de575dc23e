// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios and cross-cutting invariants for the dispatch
//! engine, exercised entirely through the public `dispatch-core` /
//! `dispatch-storage` / `dispatch-engine` / `dispatch-adapters` surface.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use dispatch_adapters::{FakeAgentRunner, FakeIssueTracker, FakeNotifier, FakePromptBuilder, Scripted, TrackerCall};
use dispatch_core::test_support::ActiveDispatchDraftBuilder;
use dispatch_core::{
    session_key_for, Activity, ActiveDispatchDraft, CompletedStatus, DispatchState, DispatchStatus,
    EngineConfig, FakeClock, IssueContext, IssueId, IssueIdentifier, NotificationKind,
    SessionPhase, SystemClock, WatchdogConfig, PROCESSED_EVENTS_CAPACITY,
};
use dispatch_engine::{BackgroundMonitor, HookAdapter, Pipeline, SessionRegistry, Watchdog};
use dispatch_storage::{
    complete, patch_active, register, register_session, session_mapping, transition,
    CompleteRequest, FsStateWriter, LockTiming, LockedStore, TransitionPatch,
};

type TestPipeline = Pipeline<FakeAgentRunner, FakeIssueTracker, FakeNotifier, FakePromptBuilder, FsStateWriter, FakeClock>;
type TestMonitor = BackgroundMonitor<FakeAgentRunner, FakeIssueTracker, FakeNotifier, FakePromptBuilder, FsStateWriter, FakeClock>;
type TestHook = HookAdapter<FakeAgentRunner, FakeIssueTracker, FakeNotifier, FakePromptBuilder, FsStateWriter, FakeClock>;

struct Harness {
    _dir: TempDir,
    pipeline: Arc<TestPipeline>,
    monitor: TestMonitor,
    hook: TestHook,
    runner: FakeAgentRunner,
    tracker: FakeIssueTracker,
    notifier: FakeNotifier,
    clock: FakeClock,
}

fn harness(config: EngineConfig) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let clock = FakeClock::new();
    let store = Arc::new(LockedStore::with_writer_and_clock(
        dir.path().join("state.json"),
        FsStateWriter,
        clock.clone(),
    ));
    let runner = FakeAgentRunner::new();
    let tracker = FakeIssueTracker::new();
    let notifier = FakeNotifier::new();

    let pipeline = Arc::new(Pipeline::new(
        store,
        Arc::new(runner.clone()),
        Arc::new(tracker.clone()),
        Arc::new(notifier.clone()),
        Arc::new(FakePromptBuilder::new()),
        Arc::new(SessionRegistry::new()),
        config,
        clock.clone(),
    ));
    let monitor = BackgroundMonitor::new(pipeline.clone());
    let hook = HookAdapter::new(pipeline.clone());

    Harness {
        _dir: dir,
        pipeline,
        monitor,
        hook,
        runner,
        tracker,
        notifier,
        clock,
    }
}

/// Matches `ActiveDispatchDraftBuilder`'s fixed computed `issue_id`.
fn issue(identifier: &str) -> IssueContext {
    IssueContext {
        id: IssueId::new("issue-ct-100"),
        identifier: IssueIdentifier::new(identifier),
        title: format!("Fix {identifier}"),
        description: "broken".into(),
        comments: Vec::new(),
    }
}

fn draft(identifier: &str) -> ActiveDispatchDraft {
    ActiveDispatchDraftBuilder::default().issue_identifier(identifier).build()
}

fn pass_verdict() -> &'static str {
    r#"Audit complete. {"pass": true, "criteria": ["builds"], "gaps": [], "testResults": "3 passed"}"#
}

fn fail_verdict() -> &'static str {
    r#"{"pass": false, "criteria": [], "gaps": ["missing tests"], "testResults": null}"#
}

/// The session-map-consistency invariant (P3): every mapping names a live
/// active dispatch, at the same attempt, whose matching session-key field
/// points back at that same key.
fn assert_session_map_consistent(state: &DispatchState) {
    for (key, mapping) in &state.session_map {
        let record = state
            .dispatches
            .active
            .get(&mapping.dispatch_id)
            .expect("session map entry must reference a live active dispatch");
        assert_eq!(record.attempt, mapping.attempt);
        let bound = match mapping.phase {
            SessionPhase::Worker => &record.worker_session_key,
            SessionPhase::Audit => &record.audit_session_key,
        };
        assert_eq!(bound.as_ref(), Some(key));
    }
}

// ---------------------------------------------------------------------
// S1-S6: concrete end-to-end scenarios
// ---------------------------------------------------------------------

#[tokio::test]
async fn s1_happy_path_single_attempt_completion() {
    let h = harness(EngineConfig::default());
    h.tracker.seed_issue(issue("CT-100"));
    h.runner.push(Scripted::success("worker done"));
    h.runner.push(Scripted::success(pass_verdict()));

    h.pipeline.dispatch(draft("CT-100"), issue("CT-100")).await.unwrap();

    let id = IssueIdentifier::new("CT-100");
    let state = h.pipeline.store().read().unwrap();
    assert!(!state.dispatches.active.contains_key(&id));
    let completed = &state.dispatches.completed[&id];
    assert_eq!(completed.status, CompletedStatus::Done);
    assert_eq!(completed.total_attempts, 1);
    assert_eq!(h.notifier.count(NotificationKind::AuditPass), 1);
    assert!(state.session_map.is_empty(), "completion must purge session mappings");
}

#[tokio::test]
async fn s2_single_rework_then_pass() {
    let h = harness(EngineConfig::default());
    h.tracker.seed_issue(issue("CT-101"));
    h.runner.push(Scripted::success("attempt 0"));
    h.runner.push(Scripted::success(fail_verdict()));
    h.runner.push(Scripted::success("attempt 1, gaps addressed"));
    h.runner.push(Scripted::success(pass_verdict()));

    h.pipeline.dispatch(draft("CT-101"), issue("CT-101")).await.unwrap();

    let id = IssueIdentifier::new("CT-101");
    let state = h.pipeline.store().read().unwrap();
    let completed = &state.dispatches.completed[&id];
    assert_eq!(completed.status, CompletedStatus::Done);
    assert_eq!(completed.total_attempts, 2);
    assert_eq!(h.notifier.count(NotificationKind::AuditFail), 1);
    assert_eq!(h.notifier.count(NotificationKind::AuditPass), 1);
}

#[tokio::test]
async fn s3_escalation_after_exhausting_rework_attempts() {
    let mut config = EngineConfig::default();
    config.max_rework_attempts = 1;
    let h = harness(config);
    h.tracker.seed_issue(issue("CT-102"));
    h.runner.push(Scripted::success("attempt 0"));
    h.runner.push(Scripted::success(fail_verdict()));
    h.runner.push(Scripted::success("attempt 1"));
    h.runner.push(Scripted::success(fail_verdict()));

    h.pipeline.dispatch(draft("CT-102"), issue("CT-102")).await.unwrap();

    let id = IssueIdentifier::new("CT-102");
    let state = h.pipeline.store().read().unwrap();
    let record = &state.dispatches.active[&id];
    assert_eq!(record.status, DispatchStatus::Stuck);
    assert_eq!(record.stuck_reason.as_deref(), Some("audit_failed_max_attempts"));
    assert!(!state.dispatches.completed.contains_key(&id));
    assert_eq!(h.notifier.count(NotificationKind::Escalation), 1);
}

#[tokio::test]
async fn s4_watchdog_kill_is_retried_once_then_succeeds() {
    let h = harness(EngineConfig::default());
    h.tracker.seed_issue(issue("CT-103"));

    h.runner.push(Scripted::killed(130_000));
    h.runner.push(Scripted::success("worker done on retry"));
    h.runner.push(Scripted::success(pass_verdict()));

    h.pipeline.dispatch(draft("CT-103"), issue("CT-103")).await.unwrap();

    let id = IssueIdentifier::new("CT-103");
    let state = h.pipeline.store().read().unwrap();
    assert!(!state.dispatches.active.contains_key(&id));
    assert_eq!(state.dispatches.completed[&id].status, CompletedStatus::Done);
    assert_eq!(h.runner.calls().len(), 3, "initial worker run + one retry + the audit run");

    let saw_retry_notice = h.tracker.calls().iter().any(|call| {
        matches!(
            call,
            TrackerCall::EmitActivity { activity: Activity::Thought { body }, .. } if body.contains("retrying")
        )
    });
    assert!(saw_retry_notice, "expected a retry notice after the watchdog kill");
}

#[tokio::test]
async fn s5_duplicate_completion_event_triggers_audit_exactly_once() {
    let h = harness(EngineConfig::default());
    h.tracker.seed_issue(issue("CT-104"));
    let identifier = IssueIdentifier::new("CT-104");

    h.pipeline.store().mutate(|state| register(state, draft("CT-104"), h.clock.epoch_ms())).unwrap();
    h.pipeline
        .store()
        .mutate(|state| {
            patch_active(state, &identifier, |record| record.status = DispatchStatus::Working);
            Ok::<(), std::convert::Infallible>(())
        })
        .unwrap();

    h.runner.push(Scripted::success(pass_verdict()));

    let issue_ctx = issue("CT-104");
    // Two deliveries of the same worker-completion event, as a duplicate
    // webhook retry might produce.
    h.pipeline.trigger_audit(&identifier, &issue_ctx, 0).await.unwrap();
    h.pipeline.trigger_audit(&identifier, &issue_ctx, 0).await.unwrap();

    assert_eq!(h.runner.calls().len(), 1);
    assert_eq!(h.notifier.count(NotificationKind::Auditing), 1);
    let state = h.pipeline.store().read().unwrap();
    assert_eq!(state.dispatches.completed[&identifier].status, CompletedStatus::Done);
}

#[tokio::test]
async fn s6_background_monitor_stale_sweep_marks_idle_dispatch_stuck() {
    let mut config = EngineConfig::default();
    config.stale_max_age_ms = 3_600_000;
    let h = harness(config);
    let id = IssueIdentifier::new("CT-105");
    h.pipeline.store().mutate(|state| register(state, draft("CT-105"), h.clock.epoch_ms())).unwrap();

    h.clock.advance(Duration::from_secs(3 * 60 * 60));
    let summary = h.monitor.tick().await;

    assert_eq!(summary.staled, vec![id.clone()]);
    let state = h.pipeline.store().read().unwrap();
    let record = &state.dispatches.active[&id];
    assert_eq!(record.status, DispatchStatus::Stuck);
    assert_eq!(record.stuck_reason.as_deref(), Some("stale_no_progress"));
    assert_eq!(h.notifier.count(NotificationKind::Stuck), 1);
}

// ---------------------------------------------------------------------
// P1-P8: testable properties
// ---------------------------------------------------------------------

#[test]
fn p1_exclusive_presence_active_and_completed_never_both_hold_an_identifier() {
    let mut state = DispatchState::empty();
    let id = IssueIdentifier::new("CT-200");
    register(&mut state, draft("CT-200"), 0).unwrap();
    assert!(state.dispatches.active.contains_key(&id));
    assert!(!state.dispatches.completed.contains_key(&id));

    complete(
        &mut state,
        &id,
        CompleteRequest { status: CompletedStatus::Done, completed_at_ms: 1_000, pr_url: None },
    )
    .unwrap();
    assert!(!state.dispatches.active.contains_key(&id));
    assert!(state.dispatches.completed.contains_key(&id));
}

#[test]
fn p2_transition_rejects_illegal_targets_and_stale_cas_expectations() {
    let mut state = DispatchState::empty();
    let id = IssueIdentifier::new("CT-201");
    register(&mut state, draft("CT-201"), 0).unwrap();

    // Dispatched -> Done skips the state machine entirely.
    let err = transition(&mut state, &id, DispatchStatus::Dispatched, DispatchStatus::Done, TransitionPatch::default())
        .unwrap_err();
    assert_eq!(err.actual, Some(DispatchStatus::Dispatched));

    transition(&mut state, &id, DispatchStatus::Dispatched, DispatchStatus::Working, TransitionPatch::default())
        .unwrap();

    // The record has since moved on; the same CAS expectation is now stale.
    let err = transition(&mut state, &id, DispatchStatus::Dispatched, DispatchStatus::Working, TransitionPatch::default())
        .unwrap_err();
    assert_eq!(err.actual, Some(DispatchStatus::Working));
}

mod properties {
    //! P2/P4/P5 as genuine `proptest!` properties over the full input
    //! space rather than a handful of fixed examples.
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn arb_status() -> impl Strategy<Value = DispatchStatus> {
        prop_oneof![
            Just(DispatchStatus::Dispatched),
            Just(DispatchStatus::Working),
            Just(DispatchStatus::Auditing),
            Just(DispatchStatus::Done),
            Just(DispatchStatus::Failed),
            Just(DispatchStatus::Stuck),
        ]
    }

    proptest! {
        #[test]
        fn p2_transition_legality_matches_the_state_machine_graph(from in arb_status(), to in arb_status()) {
            let mut state = DispatchState::empty();
            let id = IssueIdentifier::new("CT-PROP");
            register(&mut state, draft("CT-PROP"), 0).unwrap();
            patch_active(&mut state, &id, |record| record.status = from);

            let should_succeed = from.can_transition_to(to) || (to == DispatchStatus::Stuck && from.can_escalate_to_stuck());
            let result = transition(&mut state, &id, from, to, TransitionPatch::default());
            prop_assert_eq!(result.is_ok(), should_succeed);
            if should_succeed {
                prop_assert_eq!(state.dispatches.active[&id].status, to);
            } else {
                prop_assert_eq!(state.dispatches.active[&id].status, from);
            }
        }

        #[test]
        fn p4_mark_event_processed_never_reports_true_twice_for_the_same_key(
            keys in prop::collection::vec("[a-z]{1,8}", 1..60)
        ) {
            let mut state = DispatchState::empty();
            let mut seen = HashSet::new();
            for key in keys {
                let is_new = state.mark_event_processed(key.clone());
                prop_assert_eq!(is_new, seen.insert(key));
            }
        }

        #[test]
        fn p5_processed_events_fifo_never_exceeds_its_bound(count in 0usize..500) {
            let mut state = DispatchState::empty();
            for i in 0..count {
                state.mark_event_processed(format!("k{i}"));
            }
            prop_assert!(state.processed_events.len() <= PROCESSED_EVENTS_CAPACITY);
            if count > PROCESSED_EVENTS_CAPACITY {
                prop_assert_eq!(state.processed_events.front().unwrap(), &format!("k{}", count - PROCESSED_EVENTS_CAPACITY));
            }
        }
    }
}

#[test]
fn p3_session_map_entries_stay_consistent_with_their_active_dispatch() {
    let mut state = DispatchState::empty();
    let id = IssueIdentifier::new("CT-202");
    register(&mut state, draft("CT-202"), 0).unwrap();

    let key = session_key_for(SessionPhase::Worker, &id, 0);
    let mut patch = TransitionPatch::default();
    patch.worker_session_key = Some(Some(key.clone()));
    transition(&mut state, &id, DispatchStatus::Dispatched, DispatchStatus::Working, patch).unwrap();
    register_session(&mut state, key, session_mapping(id, SessionPhase::Worker, 0));

    assert_session_map_consistent(&state);
}

#[tokio::test]
async fn p6_rework_never_exceeds_the_configured_ceiling() {
    let mut config = EngineConfig::default();
    config.max_rework_attempts = 2;
    let h = harness(config);
    h.tracker.seed_issue(issue("CT-203"));

    h.runner.push(Scripted::success("attempt 0"));
    h.runner.push(Scripted::success(fail_verdict()));
    h.runner.push(Scripted::success("attempt 1"));
    h.runner.push(Scripted::success(fail_verdict()));
    h.runner.push(Scripted::success("attempt 2"));
    h.runner.push(Scripted::success(fail_verdict()));

    h.pipeline.dispatch(draft("CT-203"), issue("CT-203")).await.unwrap();

    assert_eq!(h.notifier.count(NotificationKind::AuditFail), 2, "exactly maxReworkAttempts reworks");
    assert_eq!(h.notifier.count(NotificationKind::Escalation), 1);
    let id = IssueIdentifier::new("CT-203");
    let state = h.pipeline.store().read().unwrap();
    let record = &state.dispatches.active[&id];
    assert_eq!(record.attempt, 2);
    assert_eq!(record.status, DispatchStatus::Stuck);
}

#[tokio::test(start_paused = true)]
async fn p7_watchdog_on_kill_fires_at_most_once_across_restarts() {
    let clock = FakeClock::new();
    let kills = Arc::new(AtomicUsize::new(0));
    let kills2 = kills.clone();
    let watchdog = Watchdog::new(
        WatchdogConfig { inactivity_ms: 1_000, max_total_ms: 60_000, tool_timeout_ms: 10_000 },
        clock.clone(),
        move |_| {
            kills2.fetch_add(1, Ordering::SeqCst);
        },
    );

    watchdog.start();
    clock.advance(Duration::from_millis(1_100));
    tokio::time::advance(Duration::from_millis(1_100)).await;
    tokio::task::yield_now().await;
    assert!(watchdog.was_killed());

    // Restarting an already-killed watchdog must not re-arm a second fire.
    watchdog.start();
    clock.advance(Duration::from_millis(5_000));
    tokio::time::advance(Duration::from_millis(5_000)).await;
    tokio::task::yield_now().await;

    assert_eq!(kills.load(Ordering::SeqCst), 1);
}

#[test]
fn p8_concurrent_mutations_serialize_without_lost_updates() {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(
        LockedStore::with_writer_and_clock(dir.path().join("state.json"), FsStateWriter, SystemClock).with_lock_timing(
            LockTiming { retry_interval: Duration::from_millis(2), acquire_deadline: Duration::from_secs(10), stale_lock_age_ms: 30_000 },
        ),
    );

    let id = IssueIdentifier::new("CT-300");
    store.mutate(|state| register(state, draft("CT-300"), 0)).unwrap();

    const THREADS: u32 = 4;
    const ITERATIONS: u32 = 100;
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = store.clone();
            let id = id.clone();
            std::thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    store
                        .mutate(|state| {
                            patch_active(state, &id, |record| record.attempt += 1);
                            Ok::<(), std::convert::Infallible>(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Lock safety (P8): every one of THREADS * ITERATIONS increments landed
    // — the final state is equivalent to some serial interleaving of the
    // concurrent mutators, none of their updates were lost to a race.
    let state = store.read().unwrap();
    assert_eq!(state.dispatches.active[&id].attempt, THREADS * ITERATIONS);
}
