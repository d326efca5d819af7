use std::sync::Arc;

use autodev_core::api::{
    render_summary, AttemptObserver, FeatureDriver, OutputFormat, RunSummary, SystemClock,
};
use autodev_plugins::factory;
use autodev_plugins::plan::Plan;
use tracing::info;

use crate::commands::cli::RunArgs;
use crate::commands::CommandContext;
use crate::error::{CliError, EXIT_CANCELLED, EXIT_OK, EXIT_TASKS_FAILED};

pub async fn handle_run(args: RunArgs, ctx: &CommandContext) -> Result<i32, CliError> {
    let plan = Plan::load(&args.plan)?;
    let features = plan.select(&args.selection.selection()?)?;
    let adaptive = args.adaptive || ctx.config.adaptive.enabled;
    info!(
        project = %plan.project_name,
        features = features.len(),
        dry_run = args.dry_run,
        adaptive,
        "loaded plan"
    );

    let parts = factory::build_scheduler(
        &ctx.config,
        adaptive,
        factory::build_probe(),
        Arc::new(SystemClock),
    )?;
    // `plan.toml` has an empty parent, meaning the current directory.
    let plan_dir = args.plan.parent().filter(|d| !d.as_os_str().is_empty());
    let work = factory::build_work(&ctx.config.work, args.dry_run, plan_dir);

    let format = OutputFormat::from(args.format);
    let show_progress = !args.quiet && format == OutputFormat::Text;
    let mut driver = FeatureDriver::from_config(
        &ctx.config.scheduler,
        parts.executor.clone(),
        work,
        ctx.cancel.clone(),
    )
    .with_ready_gate(parts.gate.clone())
    .with_progress(show_progress);
    if let Some(learner) = parts.adaptive.clone() {
        let observer: Arc<dyn AttemptObserver> = learner;
        driver = driver.with_observer(observer);
    }

    let summary = driver.run(&features).await?;
    print!("{}", render_summary(&summary, format)?);
    if format == OutputFormat::Json {
        println!();
    }
    Ok(exit_code_for(&summary))
}

pub fn exit_code_for(summary: &RunSummary) -> i32 {
    if summary.cancelled {
        EXIT_CANCELLED
    } else if summary.all_succeeded() {
        EXIT_OK
    } else {
        EXIT_TASKS_FAILED
    }
}
