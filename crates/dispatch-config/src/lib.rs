//! Dispatcher Configuration System
//!
//! This crate provides TOML-based configuration with environment variable override support.
//! The configuration is read once at startup and handed to the dispatcher; it is never
//! mutated afterwards.

use dispatch_common::logging::{init_logging_with, LogFormat};
use dispatch_common::PublishStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dispatcher: DispatcherConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub logging: LoggingConfig,
}

/// Core dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Execution strategy for notification handlers
    pub publish_strategy: PublishStrategy,
    /// Default timeout in milliseconds; 0 disables the timeout
    pub default_timeout_ms: u64,
    /// Elapsed time above which the performance behavior warns
    pub performance_threshold_ms: u64,
    /// Order notification handlers by priority before executing them
    pub notification_priority_enabled: bool,
    /// Cache resolved handlers and behaviors per message type
    pub cache_pipelines: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            publish_strategy: PublishStrategy::Sequential,
            default_timeout_ms: 30_000,
            performance_threshold_ms: 500,
            notification_priority_enabled: true,
            cache_pipelines: true,
        }
    }
}

/// Retry behavior defaults, used when a message carries no retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay; attempt N waits delay * N
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 200,
        }
    }
}

/// Circuit breaker defaults, used when a message carries no threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Time before an open circuit allows a trial call; 0 keeps it open until a reset
    pub break_duration_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            break_duration_ms: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "text" or "json"
    pub format: String,
    /// Default filter when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.format)
    }

    /// Install the global subscriber described by this section.
    pub fn init(&self, service_name: &str) -> bool {
        init_logging_with(service_name, self.log_format(), Some(&self.level))
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new();
        loader.load()
    }

    /// Check invariants the dispatcher relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.retry.max_retries > 0 && self.retry.delay_ms == 0 {
            tracing::warn!("retry.delay_ms is 0, retries will run back to back");
        }
        match self.logging.format.to_ascii_lowercase().as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::ValidationError(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                other
            ))),
        }
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Dispatcher Configuration
# Environment variables (DISPATCHER_*) override these settings

[dispatcher]
publish_strategy = "sequential"  # sequential or parallel
default_timeout_ms = 30000       # 0 = no timeout
performance_threshold_ms = 500
notification_priority_enabled = true
cache_pipelines = true

[retry]
max_retries = 3
delay_ms = 200                   # attempt N waits delay_ms * N

[circuit_breaker]
failure_threshold = 3
break_duration_ms = 0            # 0 = stay open until reset

[logging]
format = "text"                  # text or json
level = "info"
"#
        .to_string()
    }
}
