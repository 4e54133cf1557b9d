use crate::behavior::{Behavior, Payload};
use crate::error::{DispatchError, Result};
use crate::message::MessageContext;
use crate::pipeline::Next;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Logs failures and wraps handler errors in [`DispatchError::Unhandled`].
///
/// Errors raised by the dispatcher itself (validation, timeout, open circuit,
/// cancellation, ...) pass through unchanged so callers can still match on them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExceptionBehavior;

#[async_trait]
impl Behavior for ExceptionBehavior {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        match next.run(token).await {
            Ok(payload) => Ok(payload),
            Err(DispatchError::Handler(source)) => {
                error!(
                    message_type = ctx.message_type,
                    kind = %ctx.kind,
                    handler = ctx.handler,
                    error = %source,
                    "Unhandled error while dispatching"
                );
                Err(DispatchError::Unhandled {
                    message_type: ctx.message_type,
                    source: Box::new(DispatchError::Handler(source)),
                })
            }
            Err(e) => {
                error!(
                    message_type = ctx.message_type,
                    kind = %ctx.kind,
                    handler = ctx.handler,
                    error = %e,
                    "Dispatch failed"
                );
                Err(e)
            }
        }
    }
}
