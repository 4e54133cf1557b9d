//! Notification fan-out
//!
//! Every handler of a notification gets its own pipeline built from the same
//! layer list. Sequential publishing stops at the first failure; parallel
//! publishing waits for all handlers and reports every failure together.
//!
//! Parallel handlers are polled concurrently on the publishing task with
//! `join_all`, not spawned, since each pipeline borrows the notification.
//! They overlap at every await; a handler that blocks or burns CPU without
//! yielding holds up the others and should move that work to
//! `tokio::task::spawn_blocking` itself.

use crate::error::{DispatchError, HandlerFailure, PublishError, Result};
use crate::handler::NotificationHandler;
use crate::message::{MessageContext, MessageSettings, Notification};
use crate::pipeline::{notification_pipeline, run_cancellable, NotificationLayer};
use crate::registry::HandlerRegistry;
use dispatch_common::{MessageKind, PublishStrategy};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Resolved handlers and layers for one notification type.
pub(crate) struct NotificationRoute<N: Notification> {
    handlers: Vec<Arc<dyn NotificationHandler<N>>>,
    layers: Vec<NotificationLayer<N>>,
    settings: Option<MessageSettings>,
}

impl<N: Notification> NotificationRoute<N> {
    pub(crate) fn resolve(registry: &HandlerRegistry, priority_ordering: bool) -> Self {
        let mut handlers = registry.notification_handlers::<N>();
        if priority_ordering {
            // stable: equal priorities keep registration order
            handlers.sort_by_key(|h| h.priority());
        }

        Self {
            handlers,
            layers: registry.notification_layers::<N>(),
            settings: registry.settings::<N>().copied(),
        }
    }

    pub(crate) fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }
}

pub(crate) async fn fanout<N: Notification>(
    route: &NotificationRoute<N>,
    notification: &N,
    strategy: PublishStrategy,
    token: CancellationToken,
) -> Result<()> {
    let base = MessageContext::new(notification, MessageKind::Notification, route.settings.as_ref());

    if route.handlers.is_empty() {
        debug!(notification_type = base.message_type, "No handlers registered, nothing to publish");
        return Ok(());
    }

    let contexts: Vec<MessageContext> = route
        .handlers
        .iter()
        .map(|h| base.for_handler(h.name()))
        .collect();

    debug!(
        notification_type = base.message_type,
        handlers = route.handlers.len(),
        strategy = %strategy,
        "Publishing notification"
    );

    match strategy {
        PublishStrategy::Sequential => publish_sequential(route, notification, &contexts, token).await,
        PublishStrategy::Parallel => publish_parallel(route, notification, &contexts, token).await,
    }
}

async fn publish_sequential<N: Notification>(
    route: &NotificationRoute<N>,
    notification: &N,
    contexts: &[MessageContext],
    token: CancellationToken,
) -> Result<()> {
    for (handler, ctx) in route.handlers.iter().zip(contexts) {
        if token.is_cancelled() {
            return Err(DispatchError::Cancelled {
                message_type: ctx.message_type,
            });
        }

        let pipeline = notification_pipeline(handler, &route.layers, notification, ctx);
        if let Err(e) = run_cancellable(pipeline(token.clone()), &token, ctx.message_type).await {
            warn!(
                notification_type = ctx.message_type,
                handler = handler.name(),
                error = %e,
                "Notification handler failed, remaining handlers skipped"
            );
            return Err(e);
        }
    }
    Ok(())
}

async fn publish_parallel<N: Notification>(
    route: &NotificationRoute<N>,
    notification: &N,
    contexts: &[MessageContext],
    token: CancellationToken,
) -> Result<()> {
    let runs = route.handlers.iter().zip(contexts).map(|(handler, ctx)| {
        let name = handler.name();
        let child = token.child_token();
        let pipeline = notification_pipeline(handler, &route.layers, notification, ctx);
        async move {
            let result = run_cancellable(pipeline(child.clone()), &child, ctx.message_type).await;
            (name, result)
        }
    });

    let results = join_all(runs).await;
    let total = results.len();

    let failures: Vec<HandlerFailure> = results
        .into_iter()
        .filter_map(|(handler, result)| result.err().map(|error| HandlerFailure { handler, error }))
        .collect();

    if failures.is_empty() {
        return Ok(());
    }

    let notification_type = contexts
        .first()
        .map(|ctx| ctx.message_type)
        .unwrap_or_else(dispatch_common::short_type_name::<N>);

    for failure in &failures {
        warn!(
            notification_type,
            handler = failure.handler,
            error = %failure.error,
            "Notification handler failed"
        );
    }

    Err(PublishError {
        notification_type,
        succeeded: total - failures.len(),
        failures,
    }
    .into())
}
