use std::path::{Path, PathBuf};

use super::types::{ActiveHours, AppConfig};
use crate::error::ConfigError;

/// Get the default autodev data directory: ~/.autodev
pub fn get_autodev_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".autodev"))
        .ok_or(ConfigError::NoHome)
}

pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    let display = path.display().to_string();
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

pub fn load_default() -> Result<AppConfig, ConfigError> {
    // Priority 1: $AUTODEV_CONFIG
    let explicit = std::env::var("AUTODEV_CONFIG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);

    // Priority 2: ~/.autodev/config.toml, Priority 3: ./autodev.toml
    let home_config = get_autodev_data_dir().ok().map(|d| d.join("config.toml"));
    let local_config = Path::new("autodev.toml");

    let mut cfg = if let Some(path) = explicit {
        load_from_path(&path)?
    } else if let Some(path) = home_config.filter(|p| p.exists()) {
        load_from_path(&path)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    if cfg.logging.file
        && cfg
            .logging
            .directory
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        if let Ok(dir) = get_autodev_data_dir() {
            cfg.logging.directory = Some(dir.join("logs").to_string_lossy().to_string());
        }
    }

    cfg.validate()?;
    Ok(cfg)
}

/// Environment variable overrides (highest priority).
pub(crate) fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("AUTODEV_MAX_CONCURRENT_TASKS") {
        cfg.scheduler.max_concurrent_tasks =
            v.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                key: "AUTODEV_MAX_CONCURRENT_TASKS",
                value: v.clone(),
            })?;
    }

    if let Some(v) = get("AUTODEV_CPU_THRESHOLD") {
        cfg.scheduler.cpu_threshold =
            v.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                key: "AUTODEV_CPU_THRESHOLD",
                value: v.clone(),
            })?;
    }

    if let Some(v) = get("AUTODEV_ACTIVE_HOURS") {
        cfg.scheduler.active_hours =
            parse_hours(&v).ok_or_else(|| ConfigError::InvalidOverride {
                key: "AUTODEV_ACTIVE_HOURS",
                value: v.clone(),
            })?;
    }

    Ok(())
}

fn parse_hours(value: &str) -> Option<ActiveHours> {
    let (start, end) = value.trim().split_once('-')?;
    Some(ActiveHours {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
    })
}
