// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dispatch_adapters::{FakeAgentRunner, FakeIssueTracker, Scripted, TrackerCall};
use dispatch_core::{FakeClock, RunnerActivity};

fn wrapper(runner: Arc<FakeAgentRunner>) -> AgentRunWrapper<FakeAgentRunner, FakeClock> {
    AgentRunWrapper::new(runner, FakeClock::new())
}

#[tokio::test]
async fn fallback_path_runs_without_a_sink() {
    let runner = Arc::new(FakeAgentRunner::new());
    runner.push(Scripted::success("worker output"));
    let wrapper = wrapper(runner.clone());

    let result = wrapper
        .run("worker", &SessionKey::new("s1"), "go", WatchdogConfig::default(), None)
        .await;

    assert!(result.is_success());
    assert_eq!(result.output(), Some("worker output"));
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn streaming_activities_are_translated_and_forwarded() {
    let runner = Arc::new(FakeAgentRunner::new());
    runner.push(Scripted::Stream {
        activities: vec![
            RunnerActivity::Reasoning("short".into()),
            RunnerActivity::Reasoning("this reasoning chunk is long enough".into()),
            RunnerActivity::ToolStart {
                tool: "shell".into(),
                metadata: "ls -la".into(),
            },
            RunnerActivity::ToolResult {
                tool: "shell".into(),
                output: "total 0".into(),
            },
            RunnerActivity::PartialReply("...".into()),
        ],
        then: Box::new(AgentResult::Success { output: "done".into() }),
    });
    let tracker = Arc::new(FakeIssueTracker::new());
    let tracker_dyn: Arc<dyn IssueTracker> = tracker.clone();
    let wrapper = wrapper(runner);

    let result = wrapper
        .run(
            "worker",
            &SessionKey::new("s1"),
            "go",
            WatchdogConfig::default(),
            Some(tracker_dyn),
        )
        .await;

    assert!(result.is_success());
    let emitted: Vec<Activity> = tracker
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TrackerCall::EmitActivity { activity, .. } => Some(activity),
            _ => None,
        })
        .collect();

    // short reasoning and the partial-reply are dropped; the rest survive.
    assert_eq!(emitted.len(), 3);
    assert!(matches!(&emitted[0], Activity::Thought { body } if body.contains("long enough")));
    assert!(matches!(&emitted[1], Activity::Action { action, parameter }
        if action == "shell" && parameter.as_deref() == Some("ls -la")));
    assert!(matches!(&emitted[2], Activity::Action { action, parameter }
        if action == "shell" && parameter.as_deref() == Some("total 0")));
}

#[tokio::test]
async fn watchdog_kill_is_retried_exactly_once() {
    let runner = Arc::new(FakeAgentRunner::new());
    runner.push(Scripted::killed(130_000));
    runner.push(Scripted::success("recovered"));
    let tracker = Arc::new(FakeIssueTracker::new());
    let tracker_dyn: Arc<dyn IssueTracker> = tracker.clone();
    let wrapper = wrapper(runner.clone());

    let result = wrapper
        .run(
            "worker",
            &SessionKey::new("s1"),
            "go",
            WatchdogConfig::default(),
            Some(tracker_dyn),
        )
        .await;

    assert!(result.is_success());
    assert_eq!(runner.calls().len(), 2);
    let retry_notice = tracker.calls().into_iter().any(|call| {
        matches!(
            call,
            TrackerCall::EmitActivity {
                activity: Activity::Thought { body },
                ..
            } if body.contains("retrying")
        )
    });
    assert!(retry_notice, "expected a retrying notice to be emitted");
}

#[tokio::test]
async fn non_watchdog_failure_is_not_retried() {
    let runner = Arc::new(FakeAgentRunner::new());
    runner.push(Scripted::failure("compile error"));
    let wrapper = wrapper(runner.clone());

    let result = wrapper
        .run("worker", &SessionKey::new("s1"), "go", WatchdogConfig::default(), None)
        .await;

    assert!(!result.is_success());
    assert!(!result.is_watchdog_killed());
    assert_eq!(runner.calls().len(), 1);
}
