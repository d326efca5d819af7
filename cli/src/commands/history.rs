use autodev_core::api::{analyze_hours, render_analysis, AppConfig, HourAnalysis, OutputFormat};
use autodev_plugins::factory;

use crate::commands::cli::FormatArgs;
use crate::commands::CommandContext;
use crate::error::{CliError, EXIT_OK};

pub async fn handle_history(args: FormatArgs, ctx: &CommandContext) -> Result<i32, CliError> {
    let (records, analysis) = load_analysis(&ctx.config)?;
    let format = OutputFormat::from(args.format);
    print!("{}", render_analysis(analysis.as_ref(), records, format)?);
    if format == OutputFormat::Json {
        println!();
    }
    Ok(EXIT_OK)
}

/// Record count plus the hour ranking, if there is enough history for one.
pub fn load_analysis(cfg: &AppConfig) -> Result<(usize, Option<HourAnalysis>), CliError> {
    let store = factory::build_history_store(cfg)?;
    let records = store.load(cfg.adaptive.history_capacity)?;
    let count = records.len();
    if count < cfg.adaptive.min_records {
        tracing::debug!(count, min = cfg.adaptive.min_records, "history too short to rank hours");
        return Ok((count, None));
    }
    Ok((count, Some(analyze_hours(records.iter(), cfg.adaptive.top_hours))))
}
