use std::path::PathBuf;

use autodev_core::api::OutputFormat;
use autodev_plugins::plan::{FeatureSelection, PlanError};
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "autodev",
    version,
    about = "Runs feature tasks when the host is idle and the active window is open"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Only these features. Can be specified multiple times.
    #[arg(long = "feature", action = clap::ArgAction::Append)]
    pub features: Vec<String>,

    /// Only features in this priority band, e.g. "1" or "1-3".
    #[arg(long, conflicts_with = "features")]
    pub priority: Option<String>,
}

impl SelectionArgs {
    pub fn selection(&self) -> Result<FeatureSelection, PlanError> {
        if !self.features.is_empty() {
            return Ok(FeatureSelection::Names(self.features.clone()));
        }
        match self.priority.as_deref() {
            Some(band) => Ok(FeatureSelection::Priority(band.parse()?)),
            None => Ok(FeatureSelection::All),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Plan file (TOML).
    #[arg(long)]
    pub plan: PathBuf,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Simulate task work instead of running commands.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Restrict admission to historically favorable hours.
    #[arg(long, default_value_t = false)]
    pub adaptive: bool,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// No progress bars.
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    #[arg(long)]
    pub plan: PathBuf,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct FormatArgs {
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct InitArgs {
    /// Overwrite an existing config file.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the plan's features.
    Run(RunArgs),
    /// Show features, task counts and a time estimate.
    Plan(PlanArgs),
    /// Show whether a task could start right now, and why.
    Status(FormatArgs),
    /// Show the hour analysis built from execution history.
    History(FormatArgs),
    /// Write a default config to ~/.autodev/config.toml.
    Init(InitArgs),
}
