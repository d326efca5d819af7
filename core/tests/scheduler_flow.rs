mod common;

use std::sync::Arc;
use std::time::Duration;

use autodev_core::api::{
    AdaptiveConfig, AdaptiveGate, AdmissionPolicy, DenyReason, Feature, FeatureDriver,
    RetryExecutor, SchedulerError, Task, TaskQueue, TaskStatus,
};
use common::{at, harness, harness_with_hours, ScriptedWork, TestStrategy};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn tasks(feature: &str, names: &[&str]) -> Vec<Task> {
    names.iter().map(|n| Task::new(feature, *n)).collect()
}

fn feature(name: &str, priority: i32, names: &[&str]) -> Feature {
    names
        .iter()
        .fold(Feature::new(name, priority), |f, n| f.with_task(Task::new(name, *n)))
}

#[tokio::test(start_paused = true)]
async fn priority_one_tasks_start_before_priority_two() {
    let h = harness(1);
    let executor = RetryExecutor::from_config(
        &h.config,
        h.gate.clone(),
        h.slots.clone(),
        Arc::new(TestStrategy::new(3)),
    );
    let work = ScriptedWork::new(Duration::from_secs(2));
    let cancel = CancellationToken::new();

    let mut queue = TaskQueue::default();
    queue.enqueue("x", tasks("x", &["p1a", "p1b"]), 1).unwrap();
    queue.enqueue("x", tasks("x", &["p2"]), 2).unwrap();

    // Single-slot cooperative drain.
    while let Some(next) = queue.next_pending().map(|e| e.task_id.clone()) {
        let id = queue.start(&next).unwrap();
        let task = queue.get(&id).unwrap().task.clone();
        let result = tokio_test::assert_ok!(executor.run_task(&task, &work, &cancel).await);
        queue.complete(&id, result).unwrap();
    }

    assert_eq!(work.started(), vec!["p1a", "p1b", "p2"]);
    let stats = queue.statistics();
    assert_eq!(stats.total_tasks, 3);
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.average_duration, 2.0);
    assert_eq!(h.slots.running_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn always_failing_task_is_tried_exactly_max_retries_times() {
    let h = harness(1);
    let executor = Arc::new(RetryExecutor::from_config(
        &h.config,
        h.gate.clone(),
        h.slots.clone(),
        Arc::new(TestStrategy::new(h.config.max_retries)),
    ));
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(1)).failing(&["flaky"]));
    let mut driver = FeatureDriver::from_config(
        &h.config,
        executor,
        work.clone(),
        CancellationToken::new(),
    );

    let summary = driver
        .run(&[feature("x", 1, &["flaky", "steady"])])
        .await
        .unwrap();

    assert_eq!(work.attempts_of("flaky"), 3);
    assert_eq!(work.attempts_of("steady"), 1);

    let exec = driver.queue().get("x.flaky").unwrap();
    assert_eq!(exec.state, TaskStatus::Failed);
    assert_eq!(exec.attempt_count, 0);
    let result = exec.result.as_ref().unwrap();
    assert_eq!(result.attempts, 3);
    assert_eq!(result.error.as_deref(), Some("flaky failed its tests"));

    assert_eq!(summary.statistics.completed, 1);
    assert_eq!(summary.statistics.failed, 1);
    assert!(!summary.all_succeeded());
}

#[tokio::test(start_paused = true)]
async fn running_tasks_never_exceed_slots() {
    let h = harness(3);
    let executor = Arc::new(RetryExecutor::from_config(
        &h.config,
        h.gate.clone(),
        h.slots.clone(),
        Arc::new(TestStrategy::new(1)),
    ));
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(5)));
    let mut driver =
        FeatureDriver::from_config(&h.config, executor, work.clone(), CancellationToken::new());

    let summary = driver
        .run(&[feature("bulk", 1, &["a", "b", "c", "d", "e", "f", "g"])])
        .await
        .unwrap();

    assert_eq!(summary.statistics.completed, 7);
    assert!(work.peak.load(std::sync::atomic::Ordering::SeqCst) <= 3);
    assert_eq!(h.slots.running_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn busy_host_holds_tasks_until_idle() {
    let h = harness(1);
    h.probe.set(95.0, 30.0);
    let executor = Arc::new(RetryExecutor::from_config(
        &h.config,
        h.gate.clone(),
        h.slots.clone(),
        Arc::new(TestStrategy::new(1)),
    ));
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(1)));
    let mut driver =
        FeatureDriver::from_config(&h.config, executor, work.clone(), CancellationToken::new());

    let probe = h.probe.clone();
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        probe.set(10.0, 30.0);
    });

    let started = tokio::time::Instant::now();
    let summary = driver.run(&[feature("x", 1, &["a"])]).await.unwrap();
    release.await.unwrap();

    assert_eq!(summary.statistics.completed, 1);
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn cancellation_releases_slots_and_fails_in_flight_tasks() {
    let h = harness(2);
    let executor = Arc::new(RetryExecutor::from_config(
        &h.config,
        h.gate.clone(),
        h.slots.clone(),
        Arc::new(TestStrategy::new(3)),
    ));
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(1)).hanging());
    let cancel = CancellationToken::new();
    let mut driver = FeatureDriver::from_config(&h.config, executor, work.clone(), cancel.clone());

    let slots = h.slots.clone();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(slots.running_count(), 2);
        cancel.cancel();
    });

    let summary = driver
        .run(&[feature("x", 1, &["a", "b", "c"]), feature("y", 2, &["d"])])
        .await
        .unwrap();
    stopper.await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(h.slots.running_count(), 0);
    assert_eq!(work.started().len(), 2);

    let queue = driver.queue();
    for id in ["x.a", "x.b"] {
        let exec = queue.get(id).unwrap();
        assert_eq!(exec.state, TaskStatus::Failed);
        assert_eq!(exec.result.as_ref().unwrap().error.as_deref(), Some("cancelled"));
    }
    assert_eq!(queue.get("x.c").unwrap().state, TaskStatus::Pending);
    assert!(queue.get("y.d").is_none());
}

#[tokio::test(start_paused = true)]
async fn adaptive_gate_learns_from_a_run() {
    let h = harness(1);
    let adaptive = Arc::new(AdaptiveGate::new(
        h.gate.clone(),
        &AdaptiveConfig::default(),
        h.probe.clone(),
        h.clock.clone(),
    ));
    let executor = Arc::new(
        RetryExecutor::from_config(
            &h.config,
            adaptive.clone(),
            h.slots.clone(),
            Arc::new(TestStrategy::new(1)),
        )
        .with_observer(adaptive.clone()),
    );
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(1)));
    let mut driver =
        FeatureDriver::from_config(&h.config, executor, work, CancellationToken::new())
            .with_observer(adaptive.clone());

    let names: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    driver.run(&[feature("x", 1, &refs)]).await.unwrap();

    assert_eq!(adaptive.history_len(), 10);
    assert_eq!(adaptive.optimal_hours(), Some(vec![10]));

    // 11:00 is inside the 9-18 window but was never observed.
    h.clock.set(at(11, 0));
    let decision = adaptive.can_admit().await;
    assert_eq!(decision.denial(), Some(&DenyReason::NotOptimalHour { hour: 11 }));

    // Narrowing never overrides the base gate.
    h.clock.set(at(10, 0));
    h.gate.pause();
    assert_eq!(adaptive.can_admit().await.denial(), Some(&DenyReason::Paused));
}

#[tokio::test(start_paused = true)]
async fn admission_timeout_fails_task_without_running_it() {
    let h = harness(1);
    h.clock.set(at(20, 0));
    let executor = Arc::new(
        RetryExecutor::from_config(
            &h.config,
            h.gate.clone(),
            h.slots.clone(),
            Arc::new(TestStrategy::new(3)),
        )
        .with_admission_timeout(Some(Duration::from_secs(30))),
    );
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(1)));
    let mut driver =
        FeatureDriver::from_config(&h.config, executor, work.clone(), CancellationToken::new());

    let summary = driver.run(&[feature("x", 1, &["a"])]).await.unwrap();

    assert!(work.started().is_empty());
    assert_eq!(summary.statistics.failed, 1);
    let error = driver.queue().get("x.a").unwrap().result.clone().unwrap().error.unwrap();
    assert!(error.starts_with("admission wait for 'x.a' exceeded"));
}

#[tokio::test(start_paused = true)]
async fn paused_scheduler_keeps_tasks_pending_through_cancel() {
    let h = harness(2);
    h.gate.pause();
    let executor = Arc::new(RetryExecutor::from_config(
        &h.config,
        h.gate.clone(),
        h.slots.clone(),
        Arc::new(TestStrategy::new(3)),
    ));
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(1)));
    let cancel = CancellationToken::new();
    let mut driver = FeatureDriver::from_config(&h.config, executor, work.clone(), cancel.clone())
        .with_ready_gate(h.gate.clone());

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        cancel.cancel();
    });
    let summary = driver.run(&[feature("x", 1, &["a", "b"])]).await.unwrap();
    stopper.await.unwrap();

    assert!(summary.cancelled);
    assert!(work.started().is_empty());
    assert_eq!(h.slots.running_count(), 0);
    assert_eq!(summary.statistics.failed, 0);
    assert_eq!(summary.statistics.pending, 2);
    for id in ["x.a", "x.b"] {
        let exec = driver.queue().get(id).unwrap();
        assert_eq!(exec.state, TaskStatus::Pending);
        assert!(exec.started_at.is_none());
        assert!(exec.result.is_none());
    }
}

#[tokio::test(start_paused = true)]
async fn empty_window_ends_the_run_instead_of_waiting() {
    let h = harness_with_hours(1, 9, 9);
    let executor = Arc::new(RetryExecutor::from_config(
        &h.config,
        h.gate.clone(),
        h.slots.clone(),
        Arc::new(TestStrategy::new(3)),
    ));
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(1)));
    let mut driver =
        FeatureDriver::from_config(&h.config, executor, work.clone(), CancellationToken::new())
            .with_ready_gate(h.gate.clone());

    let outcome = tokio::time::timeout(
        Duration::from_secs(7 * 24 * 3600),
        driver.run(&[feature("x", 1, &["a"])]),
    )
    .await
    .expect("run must not wait for a window that never opens");

    assert!(matches!(outcome, Err(SchedulerError::EmptyWindow { hour: 9 })));
    assert!(work.started().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_window_fails_tasks_when_driven_without_ready_gate() {
    let h = harness_with_hours(1, 9, 9);
    let executor = Arc::new(RetryExecutor::from_config(
        &h.config,
        h.gate.clone(),
        h.slots.clone(),
        Arc::new(TestStrategy::new(3)),
    ));
    let work = Arc::new(ScriptedWork::new(Duration::from_secs(1)));
    let mut driver =
        FeatureDriver::from_config(&h.config, executor, work.clone(), CancellationToken::new());

    let summary = tokio::time::timeout(
        Duration::from_secs(7 * 24 * 3600),
        driver.run(&[feature("x", 1, &["a"])]),
    )
    .await
    .expect("run must not wait for a window that never opens")
    .unwrap();

    assert!(work.started().is_empty());
    assert_eq!(summary.statistics.failed, 1);
    let error = driver.queue().get("x.a").unwrap().result.clone().unwrap().error.unwrap();
    assert!(error.contains("is empty"));
}
