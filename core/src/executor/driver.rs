use std::any::Any;
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::queue::{FeatureProgress, Task, TaskQueue, TaskResult, TaskStatus};
use crate::scheduler::AdmissionGate;

use super::progress::ProgressMonitor;
use super::retry::RetryExecutor;
use super::traits::{AttemptObserver, TaskWork};
use super::types::{Feature, RunSummary};

type Outcome = Result<Result<TaskResult, SchedulerError>, Box<dyn Any + Send>>;

/// Drains features through the queue and the retry executor.
///
/// The driver is the only owner of its [`TaskQueue`]; spawned attempts
/// report admission over a channel and outcomes through the join set, and
/// every state change happens here. A task stays `PENDING` until its first
/// attempt is admitted.
pub struct FeatureDriver {
    queue: TaskQueue,
    executor: Arc<RetryExecutor>,
    work: Arc<dyn TaskWork>,
    ready_gate: Option<Arc<AdmissionGate>>,
    check_interval: Duration,
    observer: Option<Arc<dyn AttemptObserver>>,
    requeue_failed: bool,
    show_progress: bool,
    cancel: CancellationToken,
}

impl FeatureDriver {
    pub fn new(
        executor: Arc<RetryExecutor>,
        work: Arc<dyn TaskWork>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue: TaskQueue::default(),
            executor,
            work,
            ready_gate: None,
            check_interval: Duration::from_secs(60),
            observer: None,
            requeue_failed: false,
            show_progress: false,
            cancel,
        }
    }

    pub fn from_config(
        config: &SchedulerConfig,
        executor: Arc<RetryExecutor>,
        work: Arc<dyn TaskWork>,
        cancel: CancellationToken,
    ) -> Self {
        let mut driver = Self::new(executor, work, cancel);
        driver.queue = TaskQueue::new(config.max_requeues);
        driver.check_interval = config.check_interval();
        driver.requeue_failed = config.requeue_failed;
        driver
    }

    /// Wait on this gate's window and resource checks before each feature.
    pub fn with_ready_gate(mut self, gate: Arc<AdmissionGate>) -> Self {
        self.ready_gate = Some(gate);
        self
    }

    /// Told when each feature finishes, e.g. to re-rank learned hours.
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn with_requeue_failed(mut self, requeue: bool) -> Self {
        self.requeue_failed = requeue;
        self
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Process features in priority order (stable for equal priorities).
    pub async fn run(&mut self, features: &[Feature]) -> Result<RunSummary, SchedulerError> {
        let started = Instant::now();
        let mut ordered: Vec<&Feature> = features.iter().collect();
        ordered.sort_by_key(|f| f.priority);

        info!(features = ordered.len(), "run started");
        let mut processed = Vec::with_capacity(ordered.len());
        for feature in ordered {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.process_feature(feature).await {
                Ok(progress) => processed.push(progress),
                Err(SchedulerError::Cancelled) => break,
                Err(err) => return Err(err),
            }
        }

        let summary = RunSummary {
            features: processed,
            statistics: self.queue.statistics(),
            cancelled: self.cancel.is_cancelled(),
            elapsed: started.elapsed().as_secs_f64(),
        };
        info!(
            completed = summary.statistics.completed,
            failed = summary.statistics.failed,
            cancelled = summary.cancelled,
            "run finished"
        );
        Ok(summary)
    }

    /// Enqueue one feature and drive it until no task is pending or running.
    pub async fn process_feature(
        &mut self,
        feature: &Feature,
    ) -> Result<FeatureProgress, SchedulerError> {
        if let Some(gate) = &self.ready_gate {
            gate.wait_for_ready(self.check_interval, &self.cancel)
                .await?;
        }

        let ids = self
            .queue
            .enqueue(&feature.name, feature.tasks.clone(), feature.priority)?;
        info!(feature = %feature.name, tasks = ids.len(), "processing feature");

        let mut progress = ProgressMonitor::new(&feature.name, ids.len(), self.show_progress);
        let max_in_flight = self.executor.slots().max_slots();
        let mut in_flight: JoinSet<(String, Outcome)> = JoinSet::new();
        let (admitted_tx, mut admitted_rx) = mpsc::unbounded_channel::<String>();
        // Spawned but not yet admitted. One at a time keeps admission in
        // priority order.
        let mut awaiting: Option<String> = None;

        loop {
            if awaiting.is_none() && !self.cancel.is_cancelled() && in_flight.len() < max_in_flight
            {
                let next = self
                    .queue
                    .next_pending()
                    .map(|e| (e.task_id.clone(), e.task.clone()));
                if let Some((task_id, task)) = next {
                    progress.set_message(&format!("waiting for admission: {task_id}"));
                    self.spawn_attempt(&mut in_flight, task_id.clone(), task, admitted_tx.clone());
                    awaiting = Some(task_id);
                    continue;
                }
            }

            tokio::select! {
                biased;
                Some(task_id) = admitted_rx.recv() => {
                    if awaiting.as_deref() == Some(task_id.as_str()) {
                        awaiting = None;
                        progress.set_message("");
                    }
                    self.mark_started(&task_id, &mut progress);
                }
                joined = in_flight.join_next() => match joined {
                    Some(Ok((task_id, outcome))) => {
                        if awaiting.as_deref() == Some(task_id.as_str()) {
                            awaiting = None;
                            progress.set_message("");
                        }
                        self.settle(&task_id, outcome, &mut progress);
                    }
                    Some(Err(err)) => error!(error = %err, "task join failed"),
                    None => break,
                },
            }
        }

        let summary = self.queue.feature_progress(&feature.name);
        progress.finish(&summary);
        if !self.cancel.is_cancelled() {
            if let Some(observer) = &self.observer {
                observer.feature_finished(&feature.name);
            }
        }
        info!(
            feature = %feature.name,
            completed = summary.completed,
            failed = summary.failed,
            "feature finished"
        );
        Ok(summary)
    }

    fn spawn_attempt(
        &self,
        in_flight: &mut JoinSet<(String, Outcome)>,
        task_id: String,
        task: Task,
        admitted: mpsc::UnboundedSender<String>,
    ) {
        let executor = Arc::clone(&self.executor);
        let work = Arc::clone(&self.work);
        let cancel = self.cancel.clone();
        let notify_id = task_id.clone();

        in_flight.spawn(async move {
            let on_admitted = move |attempt: u32| {
                if attempt == 1 {
                    let _ = admitted.send(notify_id.clone());
                }
            };
            let run = executor.run_task_with(&task, work.as_ref(), &cancel, on_admitted);
            let outcome = AssertUnwindSafe(run).catch_unwind().await;
            (task_id, outcome)
        });
    }

    fn mark_started(&mut self, task_id: &str, progress: &mut ProgressMonitor) {
        match self.queue.start(task_id) {
            Ok(_) => progress.task_started(task_id),
            Err(err) => error!(task_name = task_id, error = %err, "could not start task"),
        }
    }

    fn settle(&mut self, task_id: &str, outcome: Outcome, progress: &mut ProgressMonitor) {
        let never_admitted = self
            .queue
            .get(task_id)
            .is_some_and(|e| e.state == TaskStatus::Pending);
        if never_admitted {
            if matches!(&outcome, Ok(Err(err)) if err.is_cancelled()) {
                debug!(task_name = task_id, "cancelled before admission, left pending");
                return;
            }
            // Admission itself failed; record the failure against the task.
            self.mark_started(task_id, progress);
        }

        let applied = match outcome {
            Ok(Ok(result)) => {
                let duration = result.duration;
                self.queue
                    .complete(task_id, result)
                    .map(|_| (TaskStatus::Completed, duration))
            }
            Ok(Err(err)) => {
                let cancelled = err.is_cancelled();
                let result = match err.last_result() {
                    Some(last) => last.clone(),
                    None => TaskResult::failure(error_chain(&err), self.elapsed(task_id)),
                };
                if !cancelled {
                    error!(task_name = task_id, error = %error_chain(&err), "task failed");
                }
                let duration = result.duration;
                self.queue
                    .fail(task_id, result, self.requeue_failed && !cancelled)
                    .map(|status| (status, duration))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(task_name = task_id, panic = %message, "task panicked");
                let result = TaskResult::failure(
                    format!("work panicked: {message}"),
                    self.elapsed(task_id),
                );
                let duration = result.duration;
                self.queue
                    .fail(task_id, result, self.requeue_failed)
                    .map(|status| (status, duration))
            }
        };

        match applied {
            Ok((status, duration)) => progress.task_finished(task_id, status, duration),
            Err(err) => error!(task_name = task_id, error = %err, "could not record outcome"),
        }
    }

    /// Seconds since the execution started.
    fn elapsed(&self, task_id: &str) -> f64 {
        self.queue
            .get(task_id)
            .and_then(|e| e.started_at)
            .map(|at| (Utc::now() - at).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::traits::RetryStrategyPlugin;
    use crate::queue::Task;
    use crate::scheduler::{AdmissionDecision, AdmissionPolicy, SlotManager};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Open;

    #[async_trait]
    impl AdmissionPolicy for Open {
        async fn can_admit(&self) -> AdmissionDecision {
            AdmissionDecision::ready()
        }
    }

    struct Closed;

    #[async_trait]
    impl AdmissionPolicy for Closed {
        async fn can_admit(&self) -> AdmissionDecision {
            AdmissionDecision::deny(crate::scheduler::DenyReason::Paused)
        }
    }

    struct Attempts(u32);

    impl RetryStrategyPlugin for Attempts {
        fn name(&self) -> &str {
            "test"
        }

        fn next_delay(&self, _attempt: u32, _error: &str) -> Option<Duration> {
            Some(Duration::from_secs(1))
        }

        fn max_attempts(&self) -> u32 {
            self.0
        }
    }

    /// Fails tasks whose name starts with "bad", panics on "boom", and tracks
    /// the highest number of concurrent executions.
    #[derive(Default)]
    struct Tracker {
        order: Mutex<Vec<String>>,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TaskWork for Tracker {
        fn name(&self) -> &str {
            "tracker"
        }

        async fn execute(&self, task: &Task) -> anyhow::Result<TaskResult> {
            self.order.lock().unwrap().push(task.name.clone());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(2)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if task.name == "boom" {
                panic!("work exploded");
            }
            if task.name.starts_with("bad") {
                return Ok(TaskResult::failure("assertion failed", 2.0));
            }
            Ok(TaskResult::success("ok", 2.0, Vec::new()))
        }
    }

    fn driver(max_slots: usize, attempts: u32, work: Arc<Tracker>) -> FeatureDriver {
        let executor = RetryExecutor::new(
            Arc::new(Open),
            Arc::new(SlotManager::new(max_slots)),
            Arc::new(Attempts(attempts)),
        )
        .with_poll_interval(Duration::from_millis(100));
        FeatureDriver::new(Arc::new(executor), work, CancellationToken::new())
    }

    fn feature(name: &str, priority: i32, tasks: &[&str]) -> Feature {
        tasks
            .iter()
            .fold(Feature::new(name, priority), |f, t| f.with_task(Task::new(name, *t)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_feature_completes_all_tasks() {
        let work = Arc::new(Tracker::default());
        let mut driver = driver(2, 1, work.clone());

        let progress = driver
            .process_feature(&feature("auth", 1, &["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(progress.completed, 3);
        assert_eq!(progress.failed, 0);
        assert_eq!(progress.progress_percent, 100.0);
        assert!(work.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(driver.queue().running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_task_is_failed_with_result() {
        let work = Arc::new(Tracker::default());
        let mut driver = driver(1, 2, work.clone());

        let progress = driver
            .process_feature(&feature("auth", 1, &["good", "bad"]))
            .await
            .unwrap();

        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        let exec = driver.queue().get("auth.bad").unwrap();
        assert_eq!(exec.state, TaskStatus::Failed);
        let result = exec.result.as_ref().unwrap();
        assert_eq!(result.error.as_deref(), Some("assertion failed"));
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_failed_runs_task_again() {
        let work = Arc::new(Tracker::default());
        let mut driver = driver(1, 1, work.clone()).with_requeue_failed(true);

        driver
            .process_feature(&feature("auth", 1, &["bad"]))
            .await
            .unwrap();

        let exec = driver.queue().get("auth.bad").unwrap();
        assert_eq!(exec.state, TaskStatus::Failed);
        assert_eq!(exec.attempt_count, 1);
        assert_eq!(work.order.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_work_fails_only_its_task() {
        let work = Arc::new(Tracker::default());
        let mut driver = driver(2, 1, work);

        let progress = driver
            .process_feature(&feature("auth", 1, &["boom", "fine"]))
            .await
            .unwrap();

        assert_eq!(progress.completed, 1);
        assert_eq!(progress.failed, 1);
        let result = driver.queue().get("auth.boom").unwrap().result.clone().unwrap();
        assert!(result.error.unwrap().contains("work exploded"));
        assert_eq!(driver.executor.slots().running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_orders_features_by_priority() {
        let work = Arc::new(Tracker::default());
        let mut driver = driver(1, 1, work.clone());

        let summary = driver
            .run(&[
                feature("late", 5, &["l1"]),
                feature("early", 1, &["e1", "e2"]),
            ])
            .await
            .unwrap();

        assert_eq!(*work.order.lock().unwrap(), vec!["e1", "e2", "l1"]);
        let names: Vec<&str> = summary.features.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
        assert_eq!(summary.statistics.completed, 3);
        assert!(summary.all_succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_feature_is_rejected() {
        let work = Arc::new(Tracker::default());
        let mut driver = driver(1, 1, work);
        let f = feature("auth", 1, &["a"]);

        driver.process_feature(&f).await.unwrap();
        let err = driver.process_feature(&f).await.unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTask { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unadmitted_tasks_stay_pending_after_cancel() {
        let work = Arc::new(Tracker::default());
        let executor = RetryExecutor::new(
            Arc::new(Closed),
            Arc::new(SlotManager::new(2)),
            Arc::new(Attempts(3)),
        );
        let cancel = CancellationToken::new();
        let mut driver = FeatureDriver::new(Arc::new(executor), work.clone(), cancel.clone());

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            cancel.cancel();
        });
        let progress = driver
            .process_feature(&feature("x", 1, &["a", "b"]))
            .await
            .unwrap();
        stopper.await.unwrap();

        assert!(work.order.lock().unwrap().is_empty());
        assert_eq!(progress.failed, 0);
        for id in ["x.a", "x.b"] {
            let exec = driver.queue().get(id).unwrap();
            assert_eq!(exec.state, TaskStatus::Pending);
            assert!(exec.started_at.is_none());
            assert!(exec.result.is_none());
        }
        assert_eq!(driver.queue().running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_failure_is_recorded_on_the_task() {
        let work = Arc::new(Tracker::default());
        let executor = RetryExecutor::new(
            Arc::new(Closed),
            Arc::new(SlotManager::new(1)),
            Arc::new(Attempts(3)),
        )
        .with_admission_timeout(Some(Duration::from_secs(20)));
        let mut driver = FeatureDriver::new(Arc::new(executor), work.clone(), CancellationToken::new());

        let progress = driver
            .process_feature(&feature("x", 1, &["a"]))
            .await
            .unwrap();

        assert!(work.order.lock().unwrap().is_empty());
        assert_eq!(progress.failed, 1);
        let exec = driver.queue().get("x.a").unwrap();
        assert_eq!(exec.state, TaskStatus::Failed);
        assert!(exec.result.as_ref().unwrap().error.as_deref().unwrap().contains("admission wait"));
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = SchedulerError::RetriesExhausted {
            task: "auth.a".into(),
            attempts: 3,
            source: anyhow::anyhow!("exit status 1"),
        };
        assert_eq!(
            error_chain(&err),
            "task 'auth.a' failed after 3 attempts: exit status 1"
        );
    }
}
