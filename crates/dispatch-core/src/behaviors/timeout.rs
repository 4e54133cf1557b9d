use crate::behavior::{Behavior, Payload};
use crate::error::{DispatchError, Result};
use crate::message::{MessageContext, TimeoutPolicy};
use crate::pipeline::Next;
use async_trait::async_trait;
use dispatch_common::millis;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Fails the downstream chain with [`DispatchError::Timeout`] when it runs too long.
///
/// The limit comes from the message, then the per-type settings, then the
/// behavior default. Downstream runs on a child token that is cancelled when
/// the limit expires.
pub struct TimeoutBehavior {
    default: TimeoutPolicy,
}

impl TimeoutBehavior {
    pub fn new(default: TimeoutPolicy) -> Self {
        Self { default }
    }

    pub fn after(duration: Duration) -> Self {
        Self::new(TimeoutPolicy::After(duration))
    }
}

impl Default for TimeoutBehavior {
    fn default() -> Self {
        Self::after(Duration::from_secs(30))
    }
}

#[async_trait]
impl Behavior for TimeoutBehavior {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        let limit = match ctx.timeout.unwrap_or(self.default) {
            TimeoutPolicy::Infinite => return next.run(token).await,
            TimeoutPolicy::After(limit) => limit,
        };

        let child = token.child_token();
        // Downstream is dropped before the child token is cancelled, so a
        // breaker inside sees the expiry as a failure rather than a cancellation.
        let outcome = tokio::time::timeout(limit, next.run(child.clone())).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                child.cancel();
                let duration_ms = millis(limit);
                warn!(
                    message_type = ctx.message_type,
                    kind = %ctx.kind,
                    handler = ctx.handler,
                    duration_ms,
                    "Dispatch timed out"
                );
                Err(DispatchError::Timeout {
                    message_type: ctx.message_type,
                    duration_ms,
                })
            }
        }
    }
}
