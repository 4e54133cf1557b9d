//! Structured Logging Configuration
//!
//! Every behavior in the dispatch pipeline emits `tracing` events with
//! structured fields (`message_type`, `kind`, `handler`, `elapsed_ms`, ...).
//! This module installs a subscriber that renders them:
//! - JSON output for log aggregation (LOG_FORMAT=json)
//! - Human-readable output for development (default)
//!
//! # Usage
//!
//! ```rust,ignore
//! use dispatch_common::logging::init_logging;
//!
//! fn main() {
//!     init_logging("orders-service");
//!
//!     // Dispatcher behaviors log through the installed subscriber
//!     tracing::info!(message_type = "CreateOrder", "Dispatching");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: Set to "json" for JSON output, anything else for text (default: text)
//! - `RUST_LOG`: Standard log level filter (default: info)
//!   Examples: `RUST_LOG=debug`, `RUST_LOG=dispatch_core=trace`

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Parse a format name; anything other than "json" is text.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    /// Read the format from the LOG_FORMAT environment variable.
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }
}

/// Initialize logging with the given service name.
///
/// Reads LOG_FORMAT to pick the output format and RUST_LOG for filtering
/// (defaults to INFO). Returns false when a global subscriber was already
/// installed, which is common in test binaries.
pub fn init_logging(service_name: &str) -> bool {
    init_logging_with(service_name, LogFormat::from_env(), None)
}

/// Initialize logging with an explicit format and an optional default filter.
///
/// RUST_LOG still takes precedence over `default_filter` when set.
pub fn init_logging_with(service_name: &str, format: LogFormat, default_filter: Option<&str>) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or("info")));

    let installed = match format {
        LogFormat::Json => init_json_logging(env_filter),
        LogFormat::Text => init_text_logging(env_filter),
    };

    if installed {
        tracing::debug!(service = %service_name, format = ?format, "Logging initialized");
    }
    installed
}

/// Initialize JSON logging for production.
fn init_json_logging(env_filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(false)
                .with_target(true)
                .flatten_event(true)
                .with_span_events(FmtSpan::CLOSE)
        )
        .try_init()
        .is_ok()
}

/// Initialize human-readable text logging for development.
fn init_text_logging(env_filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true)
        )
        .try_init()
        .is_ok()
}

/// Initialize logging with defaults (uses "dispatcher" as service name).
pub fn init_default_logging() -> bool {
    init_logging("dispatcher")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse(""), LogFormat::Text);
    }

    #[test]
    fn test_second_init_is_harmless() {
        init_logging_with("test", LogFormat::Text, Some("debug"));
        // A subscriber is now installed either by us or by another test
        assert!(!init_logging_with("test", LogFormat::Json, None));
    }
}
