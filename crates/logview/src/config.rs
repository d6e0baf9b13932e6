//! Server configuration for logview.
//!
//! Loads `config.toml` from `--config` or `<config_dir>/logview/`, then lets
//! command-line flags override individual values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use logview_logging::LogFormat;
use logview_sessions::{SessionScanner, DEFAULT_FRESHNESS, DEFAULT_POLL_INTERVAL};

/// The config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Server configuration loaded from `config.toml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    /// Root of the project/session tree (default: ~/.amplifier/projects)
    pub projects_dir: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    /// Prefix every route is nested under, e.g. `/logs`
    pub base_path: Option<String>,
    /// How long a scanned snapshot is served before rescanning
    pub freshness_secs: u64,
    /// Live-tail poll interval
    pub poll_interval_ms: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            projects_dir: None,
            host: "127.0.0.1".to_string(),
            port: 8180,
            base_path: None,
            freshness_secs: DEFAULT_FRESHNESS.as_secs(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub projects_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_path: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl ViewerConfig {
    /// Default location: `<config_dir>/logview/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("logview").join(CONFIG_FILE_NAME))
    }

    /// Load configuration.
    ///
    /// Returns:
    /// - defaults if no path is given and the default file does not exist
    /// - `Err(...)` if an explicit path does not exist
    /// - `Err(...)` if the file exists but fails to parse (hard error)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: ViewerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(config)
    }

    /// Apply command-line overrides. Flags win over file values.
    pub fn merge(mut self, overrides: Overrides) -> Self {
        if overrides.projects_dir.is_some() {
            self.projects_dir = overrides.projects_dir;
        }
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if overrides.base_path.is_some() {
            self.base_path = overrides.base_path;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
        self
    }

    /// Effective projects directory.
    /// Priority: configured path > ~/.amplifier/projects
    pub fn projects_dir(&self) -> Result<PathBuf> {
        match &self.projects_dir {
            Some(dir) => Ok(dir.clone()),
            None => SessionScanner::default_projects_dir()
                .context("Could not determine home directory; set projects_dir"),
        }
    }

    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
