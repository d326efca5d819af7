use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{AttemptFailed, SchedulerError};
use crate::queue::{Task, TaskResult};
use crate::scheduler::{AdmissionPolicy, DenyReason, SlotGuard, SlotManager};

use super::traits::{AttemptObserver, RetryStrategyPlugin, TaskWork};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Runs work under admission control with bounded retries.
///
/// Each attempt waits for the admission policy to allow, reserves a slot,
/// runs, and releases the slot before any retry delay. This is the only
/// place attempts are repeated.
pub struct RetryExecutor {
    gate: Arc<dyn AdmissionPolicy>,
    slots: Arc<SlotManager>,
    strategy: Arc<dyn RetryStrategyPlugin>,
    observer: Option<Arc<dyn AttemptObserver>>,
    poll_interval: Duration,
    admission_timeout: Option<Duration>,
    task_timeout: Option<Duration>,
}

impl RetryExecutor {
    pub fn new(
        gate: Arc<dyn AdmissionPolicy>,
        slots: Arc<SlotManager>,
        strategy: Arc<dyn RetryStrategyPlugin>,
    ) -> Self {
        Self {
            gate,
            slots,
            strategy,
            observer: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            admission_timeout: None,
            task_timeout: None,
        }
    }

    pub fn from_config(
        config: &SchedulerConfig,
        gate: Arc<dyn AdmissionPolicy>,
        slots: Arc<SlotManager>,
        strategy: Arc<dyn RetryStrategyPlugin>,
    ) -> Self {
        Self::new(gate, slots, strategy)
            .with_poll_interval(config.slot_poll_interval())
            .with_admission_timeout(config.admission_timeout())
            .with_task_timeout(config.task_timeout())
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_admission_timeout(mut self, limit: Option<Duration>) -> Self {
        self.admission_timeout = limit;
        self
    }

    pub fn with_task_timeout(mut self, limit: Option<Duration>) -> Self {
        self.task_timeout = limit;
        self
    }

    pub fn slots(&self) -> &Arc<SlotManager> {
        &self.slots
    }

    pub fn max_attempts(&self) -> u32 {
        self.strategy.max_attempts().max(1)
    }

    /// Poll the admission policy until it allows and a slot can be reserved.
    pub async fn admit(
        &self,
        task_name: &str,
        cancel: &CancellationToken,
    ) -> Result<SlotGuard, SchedulerError> {
        let started = Instant::now();
        loop {
            let decision = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                d = self.gate.can_admit() => d,
            };

            if decision.is_allowed() {
                if let Some(guard) = SlotGuard::try_acquire(&self.slots) {
                    return Ok(guard);
                }
                debug!(task_name, "slot taken by a concurrent attempt");
            } else if let Some(DenyReason::EmptyWindow { hour }) = decision.denial() {
                warn!(task_name, hour, "active window is empty, giving up on admission");
                return Err(SchedulerError::EmptyWindow { hour: *hour });
            } else {
                debug!(task_name, reason = %decision.reason(), "admission denied");
            }

            if let Some(limit) = self.admission_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    warn!(task_name, waited = ?waited, "admission wait timed out");
                    return Err(SchedulerError::AdmissionTimeout {
                        task: task_name.to_string(),
                        waited,
                    });
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Run `work` until it succeeds or the strategy gives up.
    ///
    /// `work` receives the 1-based attempt number. The slot held for an
    /// attempt is released on every exit path, cancellation included.
    pub async fn run_with_retry<T, F, Fut>(
        &self,
        task_name: &str,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T, SchedulerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.retry_loop(task_name, cancel, |_| {}, work).await
    }

    async fn retry_loop<T, A, F, Fut>(
        &self,
        task_name: &str,
        cancel: &CancellationToken,
        mut on_admitted: A,
        mut work: F,
    ) -> Result<T, SchedulerError>
    where
        A: FnMut(u32),
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let guard = self.admit(task_name, cancel).await?;
            on_admitted(attempt);
            info!(task_name, attempt, max_attempts, "attempt started");

            let started = Instant::now();
            let outcome = self.bounded(task_name, cancel, work(attempt)).await;
            let elapsed = started.elapsed().as_secs_f64();
            drop(guard);

            let err = match outcome {
                None => {
                    info!(task_name, attempt, "attempt cancelled");
                    return Err(SchedulerError::Cancelled);
                }
                Some(Ok(value)) => {
                    self.observe(task_name, elapsed, true).await;
                    info!(task_name, attempt, duration = elapsed, "attempt succeeded");
                    return Ok(value);
                }
                Some(Err(err)) => err,
            };
            self.observe(task_name, elapsed, false).await;

            let message = format!("{err:#}");
            let delay = if self.strategy.should_retry(attempt, &message) {
                self.strategy.next_delay(attempt, &message)
            } else {
                None
            };
            let Some(delay) = delay else {
                error!(task_name, attempts = attempt, error = %message, "retries exhausted");
                return Err(SchedulerError::RetriesExhausted {
                    task: task_name.to_string(),
                    attempts: attempt,
                    source: err,
                });
            };

            warn!(
                task_name,
                attempt,
                max_attempts,
                error = %message,
                delay = ?delay,
                "attempt failed, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run one task through [`TaskWork`], treating `success = false` as a
    /// failed attempt.
    pub async fn run_task(
        &self,
        task: &Task,
        work: &dyn TaskWork,
        cancel: &CancellationToken,
    ) -> Result<TaskResult, SchedulerError> {
        self.run_task_with(task, work, cancel, |_| {}).await
    }

    /// [`run_task`](Self::run_task), calling `on_admitted` with the attempt
    /// number each time a slot is reserved, before the work runs.
    pub async fn run_task_with<A>(
        &self,
        task: &Task,
        work: &dyn TaskWork,
        cancel: &CancellationToken,
        on_admitted: A,
    ) -> Result<TaskResult, SchedulerError>
    where
        A: FnMut(u32),
    {
        let task_name = task.id();
        self.retry_loop(&task_name, cancel, on_admitted, |attempt| async move {
            let result = work.execute(task).await?.with_attempts(attempt);
            if result.success {
                Ok(result)
            } else {
                Err(AttemptFailed { result }.into())
            }
        })
        .await
    }

    /// `None` when cancelled mid-attempt.
    async fn bounded<T, Fut>(
        &self,
        task_name: &str,
        cancel: &CancellationToken,
        fut: Fut,
    ) -> Option<anyhow::Result<T>>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let limited = async {
            match self.task_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(SchedulerError::TaskTimeout {
                        task: task_name.to_string(),
                        limit,
                    }
                    .into()),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = limited => Some(result),
        }
    }

    async fn observe(&self, task_name: &str, duration: f64, success: bool) {
        if let Some(observer) = &self.observer {
            observer.record_attempt(task_name, duration, success).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{AdmissionDecision, DenyReason};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixed {
        attempts: u32,
        delay: Duration,
    }

    impl RetryStrategyPlugin for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn next_delay(&self, _attempt: u32, _error: &str) -> Option<Duration> {
            Some(self.delay)
        }

        fn max_attempts(&self) -> u32 {
            self.attempts
        }

        fn is_fatal_error(&self, error: &str) -> bool {
            error.contains("fatal")
        }
    }

    /// Denies the first `denials` checks, then allows.
    struct Scripted {
        denials: usize,
        checks: AtomicUsize,
    }

    impl Scripted {
        fn allowing() -> Self {
            Self::denying(0)
        }

        fn denying(denials: usize) -> Self {
            Self {
                denials,
                checks: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AdmissionPolicy for Scripted {
        async fn can_admit(&self) -> AdmissionDecision {
            let n = self.checks.fetch_add(1, Ordering::SeqCst);
            if n < self.denials {
                AdmissionDecision::deny(DenyReason::Paused)
            } else {
                AdmissionDecision::ready()
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        outcomes: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl AttemptObserver for Recorder {
        async fn record_attempt(&self, _task_name: &str, _duration: f64, success: bool) {
            self.outcomes.lock().unwrap().push(success);
        }
    }

    fn executor(policy: Scripted, attempts: u32) -> RetryExecutor {
        RetryExecutor::new(
            Arc::new(policy),
            Arc::new(SlotManager::new(1)),
            Arc::new(Fixed {
                attempts,
                delay: Duration::from_secs(60),
            }),
        )
        .with_poll_interval(Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_work_runs_exactly_max_attempts() {
        let exec = executor(Scripted::allowing(), 3);
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let err = exec
            .run_with_retry("x.a", &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow::anyhow!("boom")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            SchedulerError::RetriesExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(exec.slots().running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_delay_between_attempts() {
        let exec = executor(Scripted::allowing(), 2);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let value = exec
            .run_with_retry("x.a", &cancel, |attempt| async move {
                if attempt == 1 {
                    Err(anyhow::anyhow!("flaky"))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_attempt() {
        let recorder = Arc::new(Recorder::default());
        let exec = executor(Scripted::allowing(), 3).with_observer(recorder.clone());
        let cancel = CancellationToken::new();

        exec.run_with_retry("x.a", &cancel, |attempt| async move {
            if attempt < 3 {
                Err(anyhow::anyhow!("again"))
            } else {
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(*recorder.outcomes.lock().unwrap(), vec![false, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_admitted() {
        let policy = Arc::new(Scripted::denying(3));
        let exec = RetryExecutor::new(
            policy.clone(),
            Arc::new(SlotManager::new(1)),
            Arc::new(Fixed {
                attempts: 1,
                delay: Duration::ZERO,
            }),
        )
        .with_poll_interval(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        exec.run_with_retry("x.a", &cancel, |_| async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(policy.checks.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let exec = executor(Scripted::allowing(), 5);
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let err = exec
            .run_with_retry("x.a", &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow::anyhow!("fatal: bad input")) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err,
            SchedulerError::RetriesExhausted { attempts: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_attempt_releases_slot() {
        let exec = Arc::new(executor(Scripted::allowing(), 3));
        let cancel = CancellationToken::new();

        let handle = {
            let exec = exec.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                exec.run_with_retry("x.a", &cancel, |_| async {
                    std::future::pending::<anyhow::Result<()>>().await
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(exec.slots().running_count(), 1);

        cancel.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(exec.slots().running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_delay() {
        let exec = Arc::new(executor(Scripted::allowing(), 3));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = {
            let exec = exec.clone();
            let cancel = cancel.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                exec.run_with_retry("x.a", &cancel, move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(anyhow::anyhow!("boom")) }
                })
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(exec.slots().running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_timeout_is_distinct() {
        let exec = executor(Scripted::denying(usize::MAX), 3)
            .with_admission_timeout(Some(Duration::from_secs(12)));
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let err = exec
            .run_with_retry("x.a", &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::AdmissionTimeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_timeout_counts_as_failed_attempt() {
        let exec = executor(Scripted::allowing(), 2)
            .with_task_timeout(Some(Duration::from_secs(1)));
        let cancel = CancellationToken::new();

        let err = exec
            .run_with_retry("x.a", &cancel, |_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        match err {
            SchedulerError::RetriesExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 2);
                assert!(matches!(
                    source.downcast_ref::<SchedulerError>(),
                    Some(SchedulerError::TaskTimeout { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct Failing;

    #[async_trait]
    impl TaskWork for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(&self, _task: &Task) -> anyhow::Result<TaskResult> {
            Ok(TaskResult::failure("tests did not pass", 0.5))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_task_keeps_last_failed_result() {
        let exec = executor(Scripted::allowing(), 2);
        let cancel = CancellationToken::new();
        let task = Task::new("auth", "login");

        let err = exec.run_task(&task, &Failing, &cancel).await.unwrap_err();
        let last = err.last_result().unwrap();
        assert!(!last.success);
        assert_eq!(last.attempts, 2);
        assert_eq!(last.error.as_deref(), Some("tests did not pass"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_admitted_runs_before_each_attempt() {
        let exec = executor(Scripted::denying(2), 2);
        let cancel = CancellationToken::new();
        let admitted = Mutex::new(Vec::new());
        let task = Task::new("auth", "login");

        let _ = exec
            .run_task_with(&task, &Failing, &cancel, |attempt| {
                admitted.lock().unwrap().push(attempt)
            })
            .await;

        assert_eq!(*admitted.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_admission_never_reports_admitted() {
        let exec = executor(Scripted::denying(usize::MAX), 3);
        let cancel = CancellationToken::new();
        let admitted = AtomicUsize::new(0);
        let task = Task::new("auth", "login");

        let stopper = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                cancel.cancel();
            })
        };
        let err = exec
            .run_task_with(&task, &Failing, &cancel, |_| {
                admitted.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap_err();
        stopper.await.unwrap();

        assert!(err.is_cancelled());
        assert_eq!(admitted.load(Ordering::SeqCst), 0);
    }

    struct NeverOpen;

    #[async_trait]
    impl AdmissionPolicy for NeverOpen {
        async fn can_admit(&self) -> AdmissionDecision {
            AdmissionDecision::deny(DenyReason::EmptyWindow { hour: 9 })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_window_fails_admission_at_once() {
        let exec = RetryExecutor::new(
            Arc::new(NeverOpen),
            Arc::new(SlotManager::new(1)),
            Arc::new(Fixed {
                attempts: 3,
                delay: Duration::from_secs(1),
            }),
        );
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let err = exec
            .run_with_retry("x.a", &cancel, |_| async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::EmptyWindow { hour: 9 }));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
