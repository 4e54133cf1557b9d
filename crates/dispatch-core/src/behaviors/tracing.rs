use crate::behavior::{Behavior, Payload};
use crate::error::Result;
use crate::message::MessageContext;
use crate::pipeline::Next;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{field, info_span, Instrument};

/// Runs downstream inside a `dispatch` span and records whether it succeeded.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBehavior;

#[async_trait]
impl Behavior for TracingBehavior {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        let span = info_span!(
            "dispatch",
            message_type = ctx.message_type,
            kind = %ctx.kind,
            handler = ctx.handler,
            success = field::Empty,
        );

        let result = next.run(token).instrument(span.clone()).await;
        span.record("success", result.is_ok());
        result
    }
}
