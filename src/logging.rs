//! File logging.
//!
//! The terminal belongs to the UI, so events go to a daily-rotated file
//! under `<data_dir>/dandar/logs/`. The filter comes from `DANDAR_LOG`
//! (same syntax as `RUST_LOG`), then the config's `log_level`, then `info`.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "DANDAR_LOG";
const DEFAULT_LEVEL: &str = "info";

/// Pick the filter directive: environment first, then config, then default.
pub fn resolve_filter(env_value: Option<String>, config_level: Option<&str>) -> String {
    env_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| config_level.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

pub fn default_log_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;

    Ok(data_dir.join("dandar").join("logs"))
}

/// Install the global subscriber. Keep the guard alive until exit or
/// buffered lines are lost.
pub fn init(config_level: Option<&str>, log_dir: Option<&Path>) -> Result<WorkerGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir.to_path_buf(),
        None => default_log_dir()?,
    };
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "dandar.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let directive = resolve_filter(std::env::var(LOG_ENV).ok(), config_level);
    let env_filter = EnvFilter::try_new(&directive)
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", directive, e))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::debug!(dir = %log_dir.display(), filter = %directive, "logging initialized");
    Ok(guard)
}
