use std::fmt;
use thiserror::Error;

/// A single failed validation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub property: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

/// Every validation failure collected for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message_type: &'static str,
    pub failures: Vec<ValidationFailure>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed for {}:", self.message_type)?;
        for failure in &self.failures {
            write!(f, "\n - {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// One notification handler that failed during a publish.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: &'static str,
    pub error: DispatchError,
}

/// Failures of a publish call, reported once every handler has finished.
#[derive(Debug)]
pub struct PublishError {
    pub notification_type: &'static str,
    pub failures: Vec<HandlerFailure>,
    pub succeeded: usize,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} handlers failed for {}",
            self.failures.len(),
            self.failures.len() + self.succeeded,
            self.notification_type
        )?;
        for failure in &self.failures {
            write!(f, "\n - {}: {}", failure.handler, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for PublishError {}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No handler registered for request {request_type}")]
    HandlerNotFound { request_type: &'static str },

    #[error("{count} handlers registered for request {request_type}, expected exactly one")]
    AmbiguousHandler {
        request_type: &'static str,
        count: usize,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{message_type} timed out after {duration_ms}ms")]
    Timeout {
        message_type: &'static str,
        duration_ms: u64,
    },

    #[error("Circuit open for {message_type}")]
    CircuitOpen { message_type: &'static str },

    #[error("Dispatch of {message_type} was cancelled")]
    Cancelled { message_type: &'static str },

    #[error("Failed to execute {message_type}")]
    Unhandled {
        message_type: &'static str,
        #[source]
        source: Box<DispatchError>,
    },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Behavior returned a payload of the wrong type for {message_type}")]
    PayloadMismatch { message_type: &'static str },

    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl DispatchError {
    /// Whether the retry behavior may run the pipeline again after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Handler(_)
            | DispatchError::Timeout { .. }
            | DispatchError::Publish(_) => true,
            DispatchError::Unhandled { source, .. } => source.is_retryable(),
            DispatchError::HandlerNotFound { .. }
            | DispatchError::AmbiguousHandler { .. }
            | DispatchError::Validation(_)
            | DispatchError::CircuitOpen { .. }
            | DispatchError::Cancelled { .. }
            | DispatchError::PayloadMismatch { .. } => false,
        }
    }

    /// Short label used as the `outcome` metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchError::HandlerNotFound { .. } => "handler_not_found",
            DispatchError::AmbiguousHandler { .. } => "ambiguous_handler",
            DispatchError::Validation(_) => "validation",
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::CircuitOpen { .. } => "circuit_open",
            DispatchError::Cancelled { .. } => "cancelled",
            DispatchError::Unhandled { .. } => "unhandled",
            DispatchError::Publish(_) => "publish",
            DispatchError::PayloadMismatch { .. } => "payload_mismatch",
            DispatchError::Handler(_) => "handler",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
