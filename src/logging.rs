//! File logging. The terminal belongs to the REPL, so tracing output goes to
//! `~/.techcode/logs/latest.log` instead.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "TECHCODE_LOG";

pub fn log_dir() -> PathBuf {
    crate::config::Config::base_dir().join("logs")
}

/// Install the global subscriber. `TECHCODE_LOG` overrides the level.
pub fn init(debug: bool) -> Result<PathBuf> {
    init_in(&log_dir(), debug)
}

pub fn init_in(dir: &Path, debug: bool) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let path = dir.join("latest.log");
    let file = File::create(&path)
        .with_context(|| format!("creating log file {}", path.display()))?;

    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("techcode={default_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;

    Ok(path)
}
