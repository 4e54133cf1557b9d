use crate::behavior::{Behavior, Payload};
use crate::error::Result;
use crate::message::MessageContext;
use crate::pipeline::Next;
use async_trait::async_trait;
use dispatch_common::millis;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Warns about dispatches slower than a threshold.
pub struct PerformanceBehavior {
    threshold: Duration,
}

impl PerformanceBehavior {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

impl Default for PerformanceBehavior {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl Behavior for PerformanceBehavior {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        let start = Instant::now();
        let result = next.run(token).await;
        let elapsed = start.elapsed();

        if elapsed > self.threshold {
            warn!(
                message_type = ctx.message_type,
                kind = %ctx.kind,
                handler = ctx.handler,
                elapsed_ms = millis(elapsed),
                threshold_ms = millis(self.threshold),
                "Slow dispatch"
            );
        }
        result
    }
}
