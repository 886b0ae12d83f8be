use crate::models::rule::RuleDefinition;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given. Missing is not an error.
pub const DEFAULT_CONFIG_FILE: &str = "deluge-sync.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub deluge: DelugeConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Replaces the built-in rule table when non-empty
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelugeConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub password: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Login attempts before giving up
    #[serde(default = "default_retries")]
    pub retries: u32,
    pub host_header: Option<String>,
    #[serde(default = "default_true")]
    pub verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub exclude_labels: Vec<String>,
    #[serde(
        default = "default_seed_time",
        with = "crate::utils::time::serde_duration"
    )]
    pub seed_time: Duration,
    #[serde(default = "default_seed_buffer")]
    pub seed_buffer: f64,
    #[serde(default)]
    pub path_map: HashMap<String, PathBuf>,
    #[serde(default)]
    pub label_remap: HashMap<String, String>,
    #[serde(default)]
    pub host_aliases: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub remove: bool,
    #[serde(default = "default_true", rename = "move")]
    pub relocate: bool,
    #[serde(default = "default_true")]
    pub relabel: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Only warnings and errors
    #[serde(default)]
    pub quiet: bool,
}

// Default value functions
fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_seed_time() -> Duration {
    Duration::from_secs(90 * 60)
}

fn default_seed_buffer() -> f64 {
    1.1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl Default for DelugeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            password: String::new(),
            timeout: default_timeout(),
            retries: default_retries(),
            host_header: None,
            verify: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            exclude_labels: Vec::new(),
            seed_time: default_seed_time(),
            seed_buffer: default_seed_buffer(),
            path_map: HashMap::new(),
            label_remap: HashMap::new(),
            host_aliases: HashMap::new(),
            remove: true,
            relocate: true,
            relabel: true,
            dry_run: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            quiet: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Values are not validated here: command-line overrides are applied
    /// first, then [`Config::validate`] runs on the merged result.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .context(format!("Failed to parse config file: {}", path.display()))
    }

    /// Load an explicit config file, or the default one when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.validate_logging()?;
        self.validate_deluge()?;
        self.validate_sync()
    }

    /// Settings needed to reach the daemon. Commands that never contact
    /// it skip this check.
    pub fn validate_deluge(&self) -> Result<()> {
        if self.deluge.url.trim().is_empty() {
            bail!("Deluge url must be set (config [deluge] url, --deluge-url or DELUGE_SYNC_URL)");
        }

        if !self.deluge.url.starts_with("http://") && !self.deluge.url.starts_with("https://") {
            bail!("Deluge url must start with http:// or https://, got '{}'", self.deluge.url);
        }

        if self.deluge.timeout == 0 {
            bail!("Deluge timeout must be greater than 0");
        }

        if self.deluge.retries == 0 {
            bail!("Deluge retries must be greater than 0");
        }

        Ok(())
    }

    pub fn validate_sync(&self) -> Result<()> {
        if !(self.sync.seed_buffer > 0.0 && self.sync.seed_buffer.is_finite()) {
            bail!("seed_buffer must be greater than 0, got {}", self.sync.seed_buffer);
        }

        Ok(())
    }

    pub fn validate_logging(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}
