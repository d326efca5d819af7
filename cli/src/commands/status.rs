use std::sync::Arc;

use autodev_core::api::{render_status, OutputFormat, SystemClock};
use autodev_plugins::factory;

use crate::commands::cli::FormatArgs;
use crate::commands::CommandContext;
use crate::error::{CliError, EXIT_OK};

pub async fn handle_status(args: FormatArgs, ctx: &CommandContext) -> Result<i32, CliError> {
    let parts = factory::build_scheduler(
        &ctx.config,
        false,
        factory::build_probe(),
        Arc::new(SystemClock),
    )?;
    let status = parts.gate.status().await;
    let format = OutputFormat::from(args.format);
    print!("{}", render_status(&status, format)?);
    if format == OutputFormat::Json {
        println!();
    }
    Ok(EXIT_OK)
}
