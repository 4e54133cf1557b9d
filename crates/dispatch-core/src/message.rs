//! Message traits and per-message metadata.
//!
//! Timeout, retry and circuit breaker settings resolve in this order:
//! the message instance, then the per-type table registered with
//! [`MessageSettings`], then the behavior's own default.

use dispatch_common::{short_type_name, MessageKind};
use std::any::TypeId;
use std::time::Duration;

/// Supertrait of every request and notification.
pub trait Message: Send + Sync + 'static {
    /// Instance-level timeout, takes precedence over any per-type setting.
    fn timeout(&self) -> Option<TimeoutPolicy> {
        None
    }

    /// Instance-level retry policy.
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    /// Instance-level circuit breaker threshold.
    fn failure_threshold(&self) -> Option<u32> {
        None
    }
}

/// A message with exactly one handler and a response.
///
/// Requests with nothing to return use `Response = ()`.
pub trait Request: Message {
    type Response: Send + Sync + 'static;
}

/// A message delivered to every registered handler.
pub trait Notification: Message {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// No time limit, the timeout behavior is bypassed
    Infinite,
    After(Duration),
}

impl TimeoutPolicy {
    /// 0 maps to [`TimeoutPolicy::Infinite`].
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            TimeoutPolicy::Infinite
        } else {
            TimeoutPolicy::After(Duration::from_millis(ms))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            TimeoutPolicy::Infinite => None,
            TimeoutPolicy::After(d) => Some(*d),
        }
    }
}

/// Retry policy with linear backoff: attempt N waits `delay * N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(200),
        }
    }
}

/// Per-type metadata registered at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSettings {
    pub timeout: Option<TimeoutPolicy>,
    pub retry_policy: Option<RetryPolicy>,
    pub failure_threshold: Option<u32>,
}

impl MessageSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(TimeoutPolicy::After(duration));
        self
    }

    pub fn with_infinite_timeout(mut self) -> Self {
        self.timeout = Some(TimeoutPolicy::Infinite);
        self
    }

    pub fn with_retry(mut self, max_retries: u32, delay: Duration) -> Self {
        self.retry_policy = Some(RetryPolicy::new(max_retries, delay));
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }
}

/// What a behavior knows about the message it wraps.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub type_id: TypeId,
    pub message_type: &'static str,
    pub kind: MessageKind,
    /// Set for notification pipelines, names the handler being wrapped
    pub handler: Option<&'static str>,
    pub timeout: Option<TimeoutPolicy>,
    pub retry_policy: Option<RetryPolicy>,
    pub failure_threshold: Option<u32>,
}

impl MessageContext {
    pub fn new<M: Message>(message: &M, kind: MessageKind, settings: Option<&MessageSettings>) -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            message_type: short_type_name::<M>(),
            kind,
            handler: None,
            timeout: message.timeout().or_else(|| settings.and_then(|s| s.timeout)),
            retry_policy: message
                .retry_policy()
                .or_else(|| settings.and_then(|s| s.retry_policy)),
            failure_threshold: message
                .failure_threshold()
                .or_else(|| settings.and_then(|s| s.failure_threshold)),
        }
    }

    pub fn for_handler(&self, handler: &'static str) -> Self {
        Self {
            handler: Some(handler),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl Message for Plain {}

    struct Urgent;
    impl Message for Urgent {
        fn timeout(&self) -> Option<TimeoutPolicy> {
            Some(TimeoutPolicy::After(Duration::from_millis(50)))
        }
    }

    #[test]
    fn test_instance_metadata_wins_over_type_table() {
        let settings = MessageSettings::new()
            .with_timeout(Duration::from_secs(5))
            .with_failure_threshold(7);

        let ctx = MessageContext::new(&Urgent, MessageKind::Request, Some(&settings));
        assert_eq!(ctx.timeout, Some(TimeoutPolicy::After(Duration::from_millis(50))));
        assert_eq!(ctx.failure_threshold, Some(7));
        assert_eq!(ctx.message_type, "Urgent");
    }

    #[test]
    fn test_type_table_used_when_instance_is_silent() {
        let settings = MessageSettings::new().with_infinite_timeout();
        let ctx = MessageContext::new(&Plain, MessageKind::Notification, Some(&settings));
        assert_eq!(ctx.timeout, Some(TimeoutPolicy::Infinite));
        assert_eq!(ctx.retry_policy, None);

        let bare = MessageContext::new(&Plain, MessageKind::Notification, None);
        assert_eq!(bare.timeout, None);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(600));
    }

    #[test]
    fn test_zero_millis_is_infinite() {
        assert_eq!(TimeoutPolicy::from_millis(0), TimeoutPolicy::Infinite);
        assert_eq!(
            TimeoutPolicy::from_millis(1500).duration(),
            Some(Duration::from_millis(1500))
        );
    }
}
