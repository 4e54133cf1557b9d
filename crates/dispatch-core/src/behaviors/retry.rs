use crate::behavior::{Behavior, Payload};
use crate::error::{DispatchError, Result};
use crate::message::{MessageContext, RetryPolicy};
use crate::pipeline::Next;
use async_trait::async_trait;
use dispatch_common::millis;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Re-runs the downstream chain after retryable failures.
///
/// Attempt N waits `delay * N` before running again. Everything downstream
/// repeats, including handler side effects.
pub struct RetryBehavior {
    default: RetryPolicy,
}

impl RetryBehavior {
    pub fn new(default: RetryPolicy) -> Self {
        Self { default }
    }
}

impl Default for RetryBehavior {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl Behavior for RetryBehavior {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        let policy = ctx.retry_policy.unwrap_or(self.default);
        let mut attempt: u32 = 0;

        loop {
            let err = match next.run(token.clone()).await {
                Ok(payload) => return Ok(payload),
                Err(e) => e,
            };

            if !err.is_retryable() || token.is_cancelled() {
                return Err(err);
            }
            if attempt >= policy.max_retries {
                if policy.max_retries > 0 {
                    error!(
                        message_type = ctx.message_type,
                        retries = policy.max_retries,
                        error = %err,
                        "Giving up after {} retries",
                        policy.max_retries
                    );
                }
                return Err(err);
            }

            attempt += 1;
            let delay = policy.delay_for(attempt);
            warn!(
                message_type = ctx.message_type,
                handler = ctx.handler,
                attempt,
                max_retries = policy.max_retries,
                delay_ms = millis(delay),
                error = %err,
                "Retrying after failure"
            );

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(DispatchError::Cancelled { message_type: ctx.message_type });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
