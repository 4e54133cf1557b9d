use crate::message::{RetryPolicy, TimeoutPolicy};
use dispatch_common::PublishStrategy;
use dispatch_config::AppConfig;
use std::time::Duration;

/// Circuit breaker defaults for messages without their own threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    /// When set, an open circuit admits one trial call after this long
    pub break_duration: Option<Duration>,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            break_duration: None,
        }
    }
}

/// Runtime options, built once and read by every dispatch.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub publish_strategy: PublishStrategy,
    pub default_timeout: TimeoutPolicy,
    pub performance_threshold: Duration,
    pub notification_priority_enabled: bool,
    pub cache_pipelines: bool,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerSettings,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            publish_strategy: PublishStrategy::Sequential,
            default_timeout: TimeoutPolicy::After(Duration::from_secs(30)),
            performance_threshold: Duration::from_millis(500),
            notification_priority_enabled: true,
            cache_pipelines: true,
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

impl DispatcherOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let break_duration = match config.circuit_breaker.break_duration_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Self {
            publish_strategy: config.dispatcher.publish_strategy,
            default_timeout: TimeoutPolicy::from_millis(config.dispatcher.default_timeout_ms),
            performance_threshold: Duration::from_millis(config.dispatcher.performance_threshold_ms),
            notification_priority_enabled: config.dispatcher.notification_priority_enabled,
            cache_pipelines: config.dispatcher.cache_pipelines,
            retry: RetryPolicy::new(config.retry.max_retries, Duration::from_millis(config.retry.delay_ms)),
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: config.circuit_breaker.failure_threshold,
                break_duration,
            },
        }
    }

    pub fn with_publish_strategy(mut self, strategy: PublishStrategy) -> Self {
        self.publish_strategy = strategy;
        self
    }

    pub fn with_default_timeout(mut self, timeout: TimeoutPolicy) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_priority_ordering(mut self, enabled: bool) -> Self {
        self.notification_priority_enabled = enabled;
        self
    }

    pub fn with_pipeline_cache(mut self, enabled: bool) -> Self {
        self.cache_pipelines = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config_matches_defaults() {
        let options = DispatcherOptions::from_config(&AppConfig::default());
        let defaults = DispatcherOptions::default();
        assert_eq!(options.default_timeout, defaults.default_timeout);
        assert_eq!(options.retry, defaults.retry);
        assert_eq!(options.circuit_breaker, defaults.circuit_breaker);
        assert_eq!(options.performance_threshold, defaults.performance_threshold);
    }

    #[test]
    fn test_zero_values_disable_timeout_and_break() {
        let mut config = AppConfig::default();
        config.dispatcher.default_timeout_ms = 0;
        config.circuit_breaker.break_duration_ms = 0;

        let options = DispatcherOptions::from_config(&config);
        assert_eq!(options.default_timeout, TimeoutPolicy::Infinite);
        assert_eq!(options.circuit_breaker.break_duration, None);

        config.circuit_breaker.break_duration_ms = 250;
        let options = DispatcherOptions::from_config(&config);
        assert_eq!(options.circuit_breaker.break_duration, Some(Duration::from_millis(250)));
    }
}
