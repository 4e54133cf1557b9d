//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use dispatch_common::PublishStrategy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "dispatcher.toml",
    "./config/dispatcher.toml",
    "/etc/dispatcher/config.toml",
];

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "DISPATCHER_CONFIG";

/// Configuration loader
#[derive(Debug)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    search_standard_paths: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_path: None,
            search_standard_paths: true,
        }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
            search_standard_paths: true,
        }
    }

    /// Skip the standard search paths, only the explicit path and DISPATCHER_CONFIG are used
    pub fn without_standard_paths(mut self) -> Self {
        self.search_standard_paths = false;
        self
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with(|key| env::var(key).ok())
    }

    /// Load configuration reading overrides through `lookup` instead of the process environment
    pub fn load_with<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match self.find_config_file(&lookup)? {
            Some(path) => {
                info!(?path, "Loading dispatcher configuration from file");
                AppConfig::from_file(&path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                AppConfig::default()
            }
        };

        apply_env_overrides(&mut config, &lookup)?;
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file<F>(&self, lookup: &F) -> Result<Option<PathBuf>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // An explicit path that does not exist is a caller mistake
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::ReadError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file {} not found", path.display()),
            )));
        }

        if let Some(path) = lookup(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(ConfigError::EnvError(format!(
                "{} points to missing file {}",
                CONFIG_PATH_ENV,
                path.display()
            )));
        }

        if self.search_standard_paths {
            for path in CONFIG_PATHS {
                let path = PathBuf::from(path);
                if path.exists() {
                    return Ok(Some(path));
                }
            }
        }

        Ok(None)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::EnvError(format!("{}={}: {}", key, raw, e))),
        None => Ok(None),
    }
}

/// Apply DISPATCHER_* overrides on top of file values
fn apply_env_overrides<F>(config: &mut AppConfig, lookup: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Dispatcher
    if let Some(strategy) = parse_var::<PublishStrategy, _>(lookup, "DISPATCHER_PUBLISH_STRATEGY")? {
        config.dispatcher.publish_strategy = strategy;
    }
    if let Some(ms) = parse_var(lookup, "DISPATCHER_DEFAULT_TIMEOUT_MS")? {
        config.dispatcher.default_timeout_ms = ms;
    }
    if let Some(ms) = parse_var(lookup, "DISPATCHER_PERFORMANCE_THRESHOLD_MS")? {
        config.dispatcher.performance_threshold_ms = ms;
    }
    if let Some(enabled) = parse_var(lookup, "DISPATCHER_PRIORITY_ENABLED")? {
        config.dispatcher.notification_priority_enabled = enabled;
    }
    if let Some(enabled) = parse_var(lookup, "DISPATCHER_CACHE_PIPELINES")? {
        config.dispatcher.cache_pipelines = enabled;
    }

    // Retry
    if let Some(retries) = parse_var(lookup, "DISPATCHER_RETRY_MAX_RETRIES")? {
        config.retry.max_retries = retries;
    }
    if let Some(ms) = parse_var(lookup, "DISPATCHER_RETRY_DELAY_MS")? {
        config.retry.delay_ms = ms;
    }

    // Circuit breaker
    if let Some(threshold) = parse_var(lookup, "DISPATCHER_CIRCUIT_FAILURE_THRESHOLD")? {
        config.circuit_breaker.failure_threshold = threshold;
    }
    if let Some(ms) = parse_var(lookup, "DISPATCHER_CIRCUIT_BREAK_DURATION_MS")? {
        config.circuit_breaker.break_duration_ms = ms;
    }

    // Logging
    if let Some(format) = lookup("DISPATCHER_LOG_FORMAT") {
        config.logging.format = format;
    }
    if let Some(level) = lookup("DISPATCHER_LOG_LEVEL") {
        config.logging.level = level;
    }

    Ok(())
}
