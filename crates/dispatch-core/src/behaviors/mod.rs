//! Stock behaviors
//!
//! Everything here except validation and pre/post processing is an open
//! [`Behavior`](crate::Behavior) and can wrap requests and notifications alike.

pub mod circuit_breaker;
pub mod exception;
pub mod logging;
pub mod metrics;
pub mod performance;
pub mod processors;
pub mod retry;
pub mod timeout;
pub mod tracing;
pub mod validation;

pub use circuit_breaker::{CircuitBreakerBehavior, CircuitBreakerRegistry, CircuitState, CircuitStats};
pub use exception::ExceptionBehavior;
pub use logging::LoggingBehavior;
pub use self::metrics::MetricsBehavior;
pub use performance::PerformanceBehavior;
pub use processors::{PostProcessor, PrePostProcessorBehavior, PreProcessor};
pub use retry::RetryBehavior;
pub use timeout::TimeoutBehavior;
pub use self::tracing::TracingBehavior;
pub use validation::{ValidationBehavior, Validator};
