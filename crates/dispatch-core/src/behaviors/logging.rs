use crate::behavior::{Behavior, Payload};
use crate::error::Result;
use crate::message::MessageContext;
use crate::pipeline::Next;
use async_trait::async_trait;
use dispatch_common::millis;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Logs the start and completion of every dispatch.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBehavior;

#[async_trait]
impl Behavior for LoggingBehavior {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        info!(
            message_type = ctx.message_type,
            kind = %ctx.kind,
            handler = ctx.handler,
            "Dispatch started"
        );

        let start = Instant::now();
        let result = next.run(token).await;

        info!(
            message_type = ctx.message_type,
            kind = %ctx.kind,
            handler = ctx.handler,
            elapsed_ms = millis(start.elapsed()),
            success = result.is_ok(),
            "Dispatch completed"
        );
        result
    }
}
