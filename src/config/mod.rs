//! Configuration management
//!
//! This module handles loading and parsing configuration for the qrhunt host.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::MAX_EXPIRATION_DAYS;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session lifetime and cleanup configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/qrhunt.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of a "remember me" session, in days
    #[serde(default = "default_lifetime_days")]
    pub lifetime_days: i64,
    /// Lifetime of an ordinary session, in hours
    #[serde(default = "default_short_lifetime_hours")]
    pub short_lifetime_hours: i64,
    /// Expired session sweeping
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_days: default_lifetime_days(),
            short_lifetime_hours: default_short_lifetime_hours(),
            cleanup: CleanupConfig::default(),
        }
    }
}

fn default_lifetime_days() -> i64 {
    30
}

fn default_short_lifetime_hours() -> i64 {
    8
}

/// Cleanup scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Whether the scheduler runs at all
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
    /// Seconds between sweeps (default: 24 hours)
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
    /// Seconds to wait before the first sweep
    #[serde(default = "default_cleanup_initial_delay_secs")]
    pub initial_delay_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_cleanup_enabled(),
            interval_secs: default_cleanup_interval_secs(),
            initial_delay_secs: default_cleanup_initial_delay_secs(),
        }
    }
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_cleanup_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_cleanup_initial_delay_secs() -> u64 {
    30
}

impl SessionConfig {
    /// Check that both lifetimes are positive and within `MAX_EXPIRATION_DAYS`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_EXPIRATION_DAYS).contains(&self.lifetime_days) {
            return Err(ConfigError::ValidationError(format!(
                "session.lifetime_days must be between 1 and {}, got {}",
                MAX_EXPIRATION_DAYS, self.lifetime_days
            )));
        }

        let max_hours = MAX_EXPIRATION_DAYS * 24;
        if !(1..=max_hours).contains(&self.short_lifetime_hours) {
            return Err(ConfigError::ValidationError(format!(
                "session.short_lifetime_hours must be between 1 and {}, got {}",
                max_hours, self.short_lifetime_hours
            )));
        }

        Ok(())
    }
}

impl CleanupConfig {
    /// A zero interval would sweep back to back.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.cleanup.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Wait time between successive sweeps
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Wait time before the first sweep
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, or holds out-of-range values,
    /// returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        // Handle empty file - return defaults
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - QRHUNT_DATABASE_DRIVER
    /// - QRHUNT_DATABASE_URL
    /// - QRHUNT_SESSION_LIFETIME_DAYS
    /// - QRHUNT_SESSION_SHORT_LIFETIME_HOURS
    /// - QRHUNT_SESSION_CLEANUP_ENABLED
    /// - QRHUNT_SESSION_CLEANUP_INTERVAL_SECS
    /// - QRHUNT_SESSION_CLEANUP_INITIAL_DELAY_SECS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check values the deserializer accepts but the session core cannot use
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.session.cleanup.validate()
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Database configuration
        if let Ok(driver) = std::env::var("QRHUNT_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("QRHUNT_DATABASE_URL") {
            self.database.url = url;
        }

        // Session configuration
        if let Ok(days) = std::env::var("QRHUNT_SESSION_LIFETIME_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.session.lifetime_days = days;
            }
        }
        if let Ok(hours) = std::env::var("QRHUNT_SESSION_SHORT_LIFETIME_HOURS") {
            if let Ok(hours) = hours.parse::<i64>() {
                self.session.short_lifetime_hours = hours;
            }
        }
        if let Ok(enabled) = std::env::var("QRHUNT_SESSION_CLEANUP_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => self.session.cleanup.enabled = true,
                "false" | "0" | "no" | "off" => self.session.cleanup.enabled = false,
                _ => {}
            }
        }
        if let Ok(secs) = std::env::var("QRHUNT_SESSION_CLEANUP_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.session.cleanup.interval_secs = secs;
            }
        }
        if let Ok(secs) = std::env::var("QRHUNT_SESSION_CLEANUP_INITIAL_DELAY_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                self.session.cleanup.initial_delay_secs = secs;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by `tests` and `property_tests`, both of which mutate the process environment.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "QRHUNT_DATABASE_DRIVER",
    "QRHUNT_DATABASE_URL",
    "QRHUNT_SESSION_LIFETIME_DAYS",
    "QRHUNT_SESSION_SHORT_LIFETIME_HOURS",
    "QRHUNT_SESSION_CLEANUP_ENABLED",
    "QRHUNT_SESSION_CLEANUP_INTERVAL_SECS",
    "QRHUNT_SESSION_CLEANUP_INITIAL_DELAY_SECS",
];

#[cfg(test)]
fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    let guard = CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
    guard
}
