use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between queue checks while both lanes are empty
    pub idle_poll_ms: u64,
    /// Wait for each dispatched record's outcome before admitting the next one
    pub serialize_admission: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 1,
            serialize_admission: true,
        }
    }
}

impl SchedulerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }

    /// Let each lane admit independently, gated only by its own head
    pub fn per_lane(mut self) -> Self {
        self.serialize_admission = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub login_path: String,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            login_path: "/cgi-bin/hello_world.py".to_string(),
            timeout_ms: 120000,
        }
    }
}

impl ApiConfig {
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Log every event the engine routes
    pub log_events: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { log_events: true }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            scheduler: SchedulerConfig::default(),
            api: ApiConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load the scheduler configuration.
    ///
    /// An explicit path must parse. Otherwise the first readable file among
    /// [`Config::search_paths`] wins, and defaults apply when none does.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::read_yaml(path).with_context(|| format!("Cannot use restlane config {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::read_yaml(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => log::warn!("Skipping restlane config {}: {:#}", candidate.display(), e),
            }
        }

        log::info!("No restlane config found, scheduler runs with defaults");
        Ok(Self::default())
    }

    /// `~/.config/restlane/restlane.yml`, then `./restlane.yml`
    pub fn search_paths() -> Vec<PathBuf> {
        let file_name = format!("{}.yml", env!("CARGO_PKG_NAME"));
        let mut paths = Vec::with_capacity(2);
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(env!("CARGO_PKG_NAME")).join(&file_name));
        }
        paths.push(PathBuf::from(file_name));
        paths
    }

    fn read_yaml(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Cannot read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Config file is not valid YAML")?;
        log::info!("Scheduler config loaded from {}", path.display());
        Ok(config)
    }
}
