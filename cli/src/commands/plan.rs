use autodev_core::api::{render_plan, OutputFormat};
use autodev_plugins::plan::Plan;

use crate::commands::cli::PlanArgs;
use crate::error::{CliError, EXIT_OK};

pub async fn handle_plan(args: PlanArgs) -> Result<i32, CliError> {
    let plan = Plan::load(&args.plan)?;
    let features = plan.select(&args.selection.selection()?)?;
    let format = OutputFormat::from(args.format);

    if format == OutputFormat::Text {
        println!("{} {}", plan.project_name, plan.version);
    }
    print!("{}", render_plan(&features, format)?);
    if format == OutputFormat::Json {
        println!();
    }
    Ok(EXIT_OK)
}
