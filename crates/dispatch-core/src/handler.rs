//! Handler traits
//!
//! Handlers are plain async trait objects. Failures are returned as
//! [`DispatchError`](crate::DispatchError); use `anyhow` inside the handler and
//! `?` converts into [`DispatchError::Handler`](crate::DispatchError::Handler).

use crate::error::Result;
use crate::message::{Notification, Request};
use async_trait::async_trait;
use dispatch_common::short_type_name;
use tokio_util::sync::CancellationToken;

/// Handles exactly one request type.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    async fn handle(&self, request: &R, token: CancellationToken) -> Result<R::Response>;
}

/// One of possibly many handlers of a notification type.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync {
    async fn handle(&self, notification: &N, token: CancellationToken) -> Result<()>;

    /// Lower values run first when priority ordering is enabled.
    fn priority(&self) -> i32 {
        0
    }

    /// Name used in logs and in publish failure reports.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// Overrides the priority of a wrapped notification handler.
pub struct WithPriority<H> {
    inner: H,
    priority: i32,
}

impl<H> WithPriority<H> {
    pub fn new(inner: H, priority: i32) -> Self {
        Self { inner, priority }
    }
}

#[async_trait]
impl<N, H> NotificationHandler<N> for WithPriority<H>
where
    N: Notification,
    H: NotificationHandler<N>,
{
    async fn handle(&self, notification: &N, token: CancellationToken) -> Result<()> {
        self.inner.handle(notification, token).await
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
