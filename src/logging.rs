//! Log file setup.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use log::info;

use crate::config::Config;

/// Default log directory: `<data_local_dir>/restlane/logs`
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(env!("CARGO_PKG_NAME"))
        .join("logs")
}

/// Route `log` (and `tracing`) output to the default log file.
///
/// `RUST_LOG` wins over `config.log_level`. Calling this more than once is
/// harmless; only the first call installs a logger. Returns the log file path.
pub fn init_logging(config: &Config) -> Result<PathBuf> {
    init_logging_in(&default_log_dir(), config)
}

pub fn init_logging_in(log_dir: &Path, config: &Config) -> Result<PathBuf> {
    fs::create_dir_all(log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join(format!("{}.log", env!("CARGO_PKG_NAME")));
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let level = config.log_level.as_deref().unwrap_or("info");
    let installed = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .try_init()
        .is_ok();

    if installed {
        info!("Logging initialized, writing to: {}", log_file.display());
    }
    Ok(log_file)
}
