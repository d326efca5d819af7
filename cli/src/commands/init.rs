use std::path::Path;

use autodev_core::api::{get_autodev_data_dir, AppConfig};

use crate::commands::cli::InitArgs;
use crate::error::CliError;

pub async fn handle_init(args: InitArgs) -> Result<i32, CliError> {
    let config_path = get_autodev_data_dir()?.join("config.toml");
    if write_default_config(&config_path, args.force)? {
        println!("Wrote default configuration to {}", config_path.display());
    } else {
        println!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
        println!("Use --force to overwrite it.");
    }
    Ok(crate::error::EXIT_OK)
}

/// Returns `false` when the file exists and `force` is off.
pub fn write_default_config(path: &Path, force: bool) -> Result<bool, CliError> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| CliError::Command(format!("failed to render default config: {e}")))?;
    std::fs::write(path, rendered)?;
    Ok(true)
}
