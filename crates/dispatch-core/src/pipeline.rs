//! Pipeline composition
//!
//! A pipeline is a chain of continuations. [`compose`] folds the registered
//! layers around a terminal continuation in reverse registration order, so the
//! first-registered layer ends up outermost:
//!
//! ```text
//! B1 -> B2 -> B3 -> handler -> B3 -> B2 -> B1
//! ```
//!
//! Open behaviors see an erased [`Payload`]; the binding for them boxes the
//! downstream value on the way in and downcasts it on the way out.

use crate::behavior::{Behavior, NotificationBehavior, Payload, PipelineBehavior};
use crate::error::{DispatchError, Result};
use crate::handler::{NotificationHandler, RequestHandler};
use crate::message::{MessageContext, Notification, Request};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A callable that runs the remainder of a pipeline.
pub type Continuation<'a, T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'a, Result<T>> + Send + Sync + 'a>;

/// Wrap a closure as a [`Continuation`].
pub fn continuation<'a, T, F>(f: F) -> Continuation<'a, T>
where
    F: Fn(CancellationToken) -> BoxFuture<'a, Result<T>> + Send + Sync + 'a,
{
    Arc::new(f)
}

/// Handle to the downstream part of the pipeline.
pub struct Next<'a, T> {
    continuation: Continuation<'a, T>,
}

impl<'a, T> Next<'a, T> {
    pub fn new(continuation: Continuation<'a, T>) -> Self {
        Self { continuation }
    }

    /// Run everything downstream. May be called more than once.
    pub fn run(&self, token: CancellationToken) -> BoxFuture<'a, Result<T>> {
        (self.continuation)(token)
    }
}

impl<'a, T> Clone for Next<'a, T> {
    fn clone(&self) -> Self {
        Self {
            continuation: Arc::clone(&self.continuation),
        }
    }
}

/// Fold `layers` around `terminal`, first layer outermost.
pub fn compose<'a, T, L, F>(terminal: Continuation<'a, T>, layers: &[L], bind: F) -> Continuation<'a, T>
where
    F: Fn(&L, Continuation<'a, T>) -> Continuation<'a, T>,
{
    layers
        .iter()
        .rev()
        .fold(terminal, |downstream, layer| bind(layer, downstream))
}

/// A behavior registered around a request type.
pub enum RequestLayer<R: Request> {
    Open(Arc<dyn Behavior>),
    Typed(Arc<dyn PipelineBehavior<R>>),
}

impl<R: Request> Clone for RequestLayer<R> {
    fn clone(&self) -> Self {
        match self {
            RequestLayer::Open(b) => RequestLayer::Open(Arc::clone(b)),
            RequestLayer::Typed(b) => RequestLayer::Typed(Arc::clone(b)),
        }
    }
}

/// A behavior registered around a notification type.
pub enum NotificationLayer<N: Notification> {
    Open(Arc<dyn Behavior>),
    Typed(Arc<dyn NotificationBehavior<N>>),
}

impl<N: Notification> Clone for NotificationLayer<N> {
    fn clone(&self) -> Self {
        match self {
            NotificationLayer::Open(b) => NotificationLayer::Open(Arc::clone(b)),
            NotificationLayer::Typed(b) => NotificationLayer::Typed(Arc::clone(b)),
        }
    }
}

/// Wrap an open behavior around a typed continuation.
fn bind_open<'a, T>(
    behavior: &Arc<dyn Behavior>,
    ctx: &'a MessageContext,
    downstream: Continuation<'a, T>,
) -> Continuation<'a, T>
where
    T: Send + 'static,
{
    let behavior = Arc::clone(behavior);
    let erased: Continuation<'a, Payload> = continuation(move |token| {
        let downstream = Arc::clone(&downstream);
        async move {
            let value = downstream(token).await?;
            Ok(Box::new(value) as Payload)
        }
        .boxed()
    });

    continuation(move |token| {
        let behavior = Arc::clone(&behavior);
        let next = Next::new(Arc::clone(&erased));
        async move {
            let payload = behavior.handle(ctx, next, token).await?;
            payload
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| DispatchError::PayloadMismatch {
                    message_type: ctx.message_type,
                })
        }
        .boxed()
    })
}

/// Build the full pipeline for one request.
pub fn request_pipeline<'a, R: Request>(
    handler: &Arc<dyn RequestHandler<R>>,
    layers: &[RequestLayer<R>],
    request: &'a R,
    ctx: &'a MessageContext,
) -> Continuation<'a, R::Response> {
    let handler = Arc::clone(handler);
    let terminal: Continuation<'a, R::Response> = continuation(move |token| {
        let handler = Arc::clone(&handler);
        async move { handler.handle(request, token).await }.boxed()
    });

    compose(terminal, layers, |layer, downstream| match layer {
        RequestLayer::Open(behavior) => bind_open(behavior, ctx, downstream),
        RequestLayer::Typed(behavior) => {
            let behavior = Arc::clone(behavior);
            continuation(move |token| {
                let behavior = Arc::clone(&behavior);
                let next = Next::new(Arc::clone(&downstream));
                async move { behavior.handle(request, next, token).await }.boxed()
            })
        }
    })
}

/// Build the pipeline wrapping one notification handler.
pub fn notification_pipeline<'a, N: Notification>(
    handler: &Arc<dyn NotificationHandler<N>>,
    layers: &[NotificationLayer<N>],
    notification: &'a N,
    ctx: &'a MessageContext,
) -> Continuation<'a, ()> {
    let handler = Arc::clone(handler);
    let terminal: Continuation<'a, ()> = continuation(move |token| {
        let handler = Arc::clone(&handler);
        async move { handler.handle(notification, token).await }.boxed()
    });

    compose(terminal, layers, |layer, downstream| match layer {
        NotificationLayer::Open(behavior) => bind_open(behavior, ctx, downstream),
        NotificationLayer::Typed(behavior) => {
            let behavior = Arc::clone(behavior);
            continuation(move |token| {
                let behavior = Arc::clone(&behavior);
                let next = Next::new(Arc::clone(&downstream));
                async move { behavior.handle(notification, next, token).await }.boxed()
            })
        }
    })
}

/// Drive a pipeline until it finishes or `token` is cancelled.
pub(crate) async fn run_cancellable<T>(
    pipeline: BoxFuture<'_, Result<T>>,
    token: &CancellationToken,
    message_type: &'static str,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(DispatchError::Cancelled { message_type }),
        result = pipeline => result,
    }
}
