// ABOUTME: Configuration loading and validation for the botfleet service.
// ABOUTME: Supports TOML config files with environment variable expansion.

use crate::error::{Result, ServiceError};
use botfleet_core::SupervisorSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Telegram caps getUpdates long polling at 50 seconds.
const MAX_POLL_TIMEOUT_SECS: u32 = 50;

/// Top-level configuration structure for botfleet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub supervisor: SupervisorSettings,
    pub telegram: TelegramConfig,
}

/// Where the tenant config store lives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path. `~` is expanded. Defaults to `~/.config/botfleet/tenants.db`.
    pub path: Option<String>,
}

impl DatabaseConfig {
    /// Resolved database file path.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(PathBuf::from(shellexpand::tilde(path).into_owned())),
            None => default_config_dir().map(|dir| dir.join("tenants.db")),
        }
    }
}

/// Long Polling behaviour shared by every tenant worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Seconds Telegram holds a getUpdates request open.
    pub poll_timeout_secs: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 30,
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("botfleet"))
        .ok_or_else(|| ServiceError::Config("Could not determine config path".into()))
}

impl Config {
    /// Load configuration from the specified path or default location.
    ///
    /// Default location: `~/.config/botfleet/botfleet.toml`. A missing default
    /// file yields the built-in defaults; a missing explicit path is an error.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                let path = default_config_dir()?.join("botfleet.toml");
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!(path = %path.display(), "No config file, using defaults");
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!("Failed to read config from {:?}: {}", path, e))
        })?;
        Self::parse(&contents)
    }

    /// Parse TOML text after expanding `$VAR` references.
    pub fn parse(contents: &str) -> Result<Self> {
        // Expand environment variables, warning on undefined vars.
        let contents = shellexpand::env_with_context_no_errors(contents, |var: &str| {
            match std::env::var(var) {
                Ok(val) => Some(val),
                Err(_) => {
                    warn!(
                        variable = %var,
                        "Environment variable not defined, using empty string"
                    );
                    Some(String::new())
                }
            }
        });

        toml::from_str(&contents)
            .map_err(|e| ServiceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.supervisor.stop_timeout.is_zero() {
            return Err(ServiceError::Config(
                "supervisor.stop_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.telegram.poll_timeout_secs > MAX_POLL_TIMEOUT_SECS {
            return Err(ServiceError::Config(format!(
                "telegram.poll_timeout_secs must be at most {}",
                MAX_POLL_TIMEOUT_SECS
            )));
        }
        Ok(())
    }
}
