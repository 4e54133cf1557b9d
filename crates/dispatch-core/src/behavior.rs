//! Behavior traits
//!
//! A behavior wraps the rest of the pipeline. It receives a [`Next`] that runs
//! everything downstream and may call it zero, one or several times.
//!
//! - [`Behavior`] applies to every message of a call shape and sees the value
//!   flowing through the pipeline as an erased [`Payload`]. The stock
//!   cross-cutting behaviors (logging, timeout, retry, ...) are of this kind.
//! - [`PipelineBehavior`] is bound to one request type.
//! - [`NotificationBehavior`] is bound to one notification type.

use crate::error::Result;
use crate::message::{MessageContext, Notification, Request};
use crate::pipeline::Next;
use async_trait::async_trait;
use std::any::Any;
use tokio_util::sync::CancellationToken;

/// Type-erased response carried through open behaviors.
pub type Payload = Box<dyn Any + Send>;

/// A behavior applied to every message of one call shape.
#[async_trait]
pub trait Behavior: Send + Sync {
    async fn handle(
        &self,
        ctx: &MessageContext,
        next: Next<'_, Payload>,
        token: CancellationToken,
    ) -> Result<Payload>;
}

/// A behavior bound to request type `R`.
#[async_trait]
pub trait PipelineBehavior<R: Request>: Send + Sync {
    async fn handle(
        &self,
        request: &R,
        next: Next<'_, R::Response>,
        token: CancellationToken,
    ) -> Result<R::Response>;
}

/// A behavior bound to notification type `N`, applied around each handler.
#[async_trait]
pub trait NotificationBehavior<N: Notification>: Send + Sync {
    async fn handle(
        &self,
        notification: &N,
        next: Next<'_, ()>,
        token: CancellationToken,
    ) -> Result<()>;
}
