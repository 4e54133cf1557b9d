use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod logging;

// ============================================================================
// Message Kinds
// ============================================================================

/// The two call shapes a dispatch can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A command or query with exactly one handler and a response
    Request,
    /// An event delivered to zero or more handlers
    Notification,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Notification => "notification",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Publish Strategy
// ============================================================================

/// How notification handlers of a single publish call are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStrategy {
    /// One handler at a time in priority order, stopping at the first failure
    #[default]
    Sequential,
    /// All handlers concurrently, failures reported once every handler finished
    Parallel,
}

impl fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStrategy::Sequential => f.write_str("sequential"),
            PublishStrategy::Parallel => f.write_str("parallel"),
        }
    }
}

impl std::str::FromStr for PublishStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(PublishStrategy::Sequential),
            "parallel" => Ok(PublishStrategy::Parallel),
            other => Err(format!("unknown publish strategy '{}'", other)),
        }
    }
}

// ============================================================================
// Type Names
// ============================================================================

/// Render the unqualified name of a type.
///
/// `my_app::orders::CreateOrder` becomes `CreateOrder`. For generic types only
/// the outer path is trimmed: `my_app::Envelope<my_app::orders::CreateOrder>`
/// becomes `Envelope<my_app::orders::CreateOrder>`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    shorten(std::any::type_name::<T>())
}

fn shorten(full: &'static str) -> &'static str {
    match full.find('<') {
        Some(generic_start) => {
            let (path, _) = full.split_at(generic_start);
            match path.rfind("::") {
                Some(idx) => &full[idx + 2..],
                None => full,
            }
        }
        None => full.rsplit("::").next().unwrap_or(full),
    }
}

/// Whole milliseconds in `duration` for log fields and errors, capped at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
