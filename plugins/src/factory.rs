use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use autodev_core::api::{
    get_autodev_data_dir, AdaptiveGate, AdmissionGate, AppConfig, Clock, ResourceProbe,
    RetryExecutor, RetryStrategyPlugin, SchedulerConfig, SlotManager, SysinfoMonitor, TaskWork,
    WorkConfig,
};

use crate::executor::{
    CommandWork, ExponentialBackoffPlugin, FixedDelayPlugin, LinearRetryPlugin, RetryConfig,
    SimulatedWork,
};
use crate::history::JsonlHistoryStore;

/// Everything a driver needs, wired from one config.
pub struct SchedulerParts {
    pub slots: Arc<SlotManager>,
    pub gate: Arc<AdmissionGate>,
    /// Present when adaptive scheduling is on.
    pub adaptive: Option<Arc<AdaptiveGate<AdmissionGate>>>,
    pub executor: Arc<RetryExecutor>,
}

pub fn build_retry_strategy(cfg: &SchedulerConfig) -> Result<Arc<dyn RetryStrategyPlugin>> {
    let config = RetryConfig::from_scheduler(cfg);
    Ok(match cfg.retry_strategy.as_str() {
        "fixed" => Arc::new(FixedDelayPlugin::new(config)),
        "linear" => Arc::new(LinearRetryPlugin::new(config)),
        "exponential-backoff" | "exponential" => Arc::new(ExponentialBackoffPlugin::new(config)),
        other => bail!(
            "unknown retry strategy '{other}' (expected fixed, linear or exponential-backoff)"
        ),
    })
}

/// Dry runs simulate; otherwise tasks run their shell commands, by default
/// from `plan_dir`.
pub fn build_work(cfg: &WorkConfig, dry_run: bool, plan_dir: Option<&Path>) -> Arc<dyn TaskWork> {
    if dry_run {
        return Arc::new(
            SimulatedWork::new(cfg.simulated_duration())
                .with_failing(cfg.simulated_failures.iter().cloned()),
        );
    }
    let work = CommandWork::from_config(cfg);
    match (cfg.workdir.as_deref(), plan_dir) {
        (None, Some(dir)) => Arc::new(work.with_workdir(dir)),
        _ => Arc::new(work),
    }
}

pub fn build_probe() -> Arc<dyn ResourceProbe> {
    Arc::new(SysinfoMonitor::new())
}

pub fn history_path(cfg: &AppConfig) -> Result<PathBuf> {
    match cfg.history.path.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(get_autodev_data_dir()?.join("history.jsonl")),
    }
}

pub fn build_history_store(cfg: &AppConfig) -> Result<Arc<JsonlHistoryStore>> {
    Ok(Arc::new(JsonlHistoryStore::new(history_path(cfg)?)))
}

/// Slots, base gate, optional adaptive learner (seeded from persisted
/// history) and the retry executor on top.
pub fn build_scheduler(
    cfg: &AppConfig,
    adaptive: bool,
    probe: Arc<dyn ResourceProbe>,
    clock: Arc<dyn Clock>,
) -> Result<SchedulerParts> {
    let strategy = build_retry_strategy(&cfg.scheduler)?;
    let slots = Arc::new(SlotManager::new(cfg.scheduler.max_concurrent_tasks));
    let gate = Arc::new(AdmissionGate::new(
        &cfg.scheduler,
        slots.clone(),
        probe.clone(),
        clock.clone(),
    )?);

    if !adaptive {
        let executor =
            RetryExecutor::from_config(&cfg.scheduler, gate.clone(), slots.clone(), strategy);
        return Ok(SchedulerParts {
            slots,
            gate,
            adaptive: None,
            executor: Arc::new(executor),
        });
    }

    let store = build_history_store(cfg)?;
    let learner = AdaptiveGate::new(gate.clone(), &cfg.adaptive, probe, clock)
        .with_sink(store.clone());
    let records = store
        .load(cfg.adaptive.history_capacity)
        .with_context(|| format!("failed to load history {}", store.path().display()))?;
    learner.load_history(records);
    learner.analyze();

    let learner = Arc::new(learner);
    let executor =
        RetryExecutor::from_config(&cfg.scheduler, learner.clone(), slots.clone(), strategy)
            .with_observer(learner.clone());
    Ok(SchedulerParts {
        slots,
        gate,
        adaptive: Some(learner),
        executor: Arc::new(executor),
    })
}
