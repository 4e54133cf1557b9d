//! Dispatcher - routes requests to their single handler and publishes
//! notifications to every handler, each through its behavior pipeline.

use crate::behavior::{Behavior, NotificationBehavior, PipelineBehavior};
use crate::behaviors::{
    CircuitBreakerBehavior, CircuitBreakerRegistry, ExceptionBehavior, LoggingBehavior,
    PerformanceBehavior, RetryBehavior, TimeoutBehavior,
};
use crate::error::{DispatchError, Result};
use crate::fanout::{fanout, NotificationRoute};
use crate::handler::{NotificationHandler, RequestHandler};
use crate::message::{Message, MessageContext, MessageSettings, Notification, Request};
use crate::options::DispatcherOptions;
use crate::pipeline::{request_pipeline, run_cancellable, RequestLayer};
use crate::registry::HandlerRegistry;
use dashmap::DashMap;
use dispatch_common::{short_type_name, MessageKind};
use std::any::{Any, TypeId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type CachedRoute = Arc<dyn Any + Send + Sync>;

struct RequestRoute<R: Request> {
    handler: Arc<dyn RequestHandler<R>>,
    layers: Vec<RequestLayer<R>>,
    settings: Option<MessageSettings>,
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    options: DispatcherOptions,
    request_routes: DashMap<TypeId, CachedRoute>,
    notification_routes: DashMap<TypeId, CachedRoute>,
    circuit_breakers: Option<Arc<CircuitBreakerRegistry>>,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry, options: DispatcherOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            options,
            request_routes: DashMap::new(),
            notification_routes: DashMap::new(),
            circuit_breakers: None,
        }
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Circuits of the breaker installed by [`DispatcherBuilder::with_advanced_behaviors`].
    pub fn circuit_breakers(&self) -> Option<Arc<CircuitBreakerRegistry>> {
        self.circuit_breakers.clone()
    }

    /// Send a request to its handler.
    pub async fn send<R: Request>(&self, request: &R) -> Result<R::Response> {
        self.send_with_token(request, CancellationToken::new()).await
    }

    /// Send a request; cancelling `token` aborts the pipeline with [`DispatchError::Cancelled`].
    pub async fn send_with_token<R: Request>(&self, request: &R, token: CancellationToken) -> Result<R::Response> {
        let route = self.request_route::<R>()?;
        let ctx = MessageContext::new(request, MessageKind::Request, route.settings.as_ref());

        debug!(
            request_type = ctx.message_type,
            behaviors = route.layers.len(),
            "Sending request"
        );

        let pipeline = request_pipeline(&route.handler, &route.layers, request, &ctx);
        run_cancellable(pipeline(token.clone()), &token, ctx.message_type).await
    }

    /// Send a request that has no response.
    pub async fn send_void<R>(&self, request: &R) -> Result<()>
    where
        R: Request<Response = ()>,
    {
        self.send(request).await
    }

    /// Publish a notification to every registered handler.
    ///
    /// With [`PublishStrategy::Parallel`](dispatch_common::PublishStrategy) the
    /// handlers run concurrently on the calling task rather than on spawned tasks.
    pub async fn publish<N: Notification>(&self, notification: &N) -> Result<()> {
        self.publish_with_token(notification, CancellationToken::new()).await
    }

    pub async fn publish_with_token<N: Notification>(&self, notification: &N, token: CancellationToken) -> Result<()> {
        let route = self.notification_route::<N>();
        fanout(&route, notification, self.options.publish_strategy, token).await
    }

    /// Names of the handlers of `N` in the order a publish runs them.
    pub fn handler_order<N: Notification>(&self) -> Vec<&'static str> {
        self.notification_route::<N>().handler_names()
    }

    fn request_route<R: Request>(&self) -> Result<Arc<RequestRoute<R>>> {
        let key = TypeId::of::<R>();

        if self.options.cache_pipelines {
            if let Some(cached) = self.request_routes.get(&key) {
                if let Ok(route) = Arc::clone(cached.value()).downcast::<RequestRoute<R>>() {
                    return Ok(route);
                }
            }
        }

        let mut handlers = self.registry.request_handlers::<R>();
        let handler = match handlers.len() {
            0 => {
                return Err(DispatchError::HandlerNotFound {
                    request_type: short_type_name::<R>(),
                })
            }
            1 => handlers.remove(0),
            count => {
                return Err(DispatchError::AmbiguousHandler {
                    request_type: short_type_name::<R>(),
                    count,
                })
            }
        };

        let route = Arc::new(RequestRoute {
            handler,
            layers: self.registry.request_layers::<R>(),
            settings: self.registry.settings::<R>().copied(),
        });

        if self.options.cache_pipelines {
            self.request_routes.insert(key, Arc::clone(&route) as CachedRoute);
        }
        Ok(route)
    }

    fn notification_route<N: Notification>(&self) -> Arc<NotificationRoute<N>> {
        let key = TypeId::of::<N>();

        if self.options.cache_pipelines {
            if let Some(cached) = self.notification_routes.get(&key) {
                if let Ok(route) = Arc::clone(cached.value()).downcast::<NotificationRoute<N>>() {
                    return route;
                }
            }
        }

        let route = Arc::new(NotificationRoute::<N>::resolve(
            &self.registry,
            self.options.notification_priority_enabled,
        ));

        if self.options.cache_pipelines {
            self.notification_routes.insert(key, Arc::clone(&route) as CachedRoute);
        }
        route
    }

    /// Number of message types with a cached route.
    pub fn cached_routes(&self) -> usize {
        self.request_routes.len() + self.notification_routes.len()
    }
}

/// Fluent setup for a [`Dispatcher`].
///
/// Set options before adding the stock behavior sets; they read the options
/// at the time they are added.
pub struct DispatcherBuilder {
    registry: HandlerRegistry,
    options: DispatcherOptions,
    circuit_breakers: Option<Arc<CircuitBreakerRegistry>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            options: DispatcherOptions::default(),
            circuit_breakers: None,
        }
    }

    pub fn options(mut self, options: DispatcherOptions) -> Self {
        self.options = options;
        self
    }

    pub fn request_handler<R, H>(mut self, handler: H) -> Self
    where
        R: Request,
        H: RequestHandler<R> + 'static,
    {
        self.registry.add_request_handler::<R>(Arc::new(handler));
        self
    }

    pub fn notification_handler<N, H>(mut self, handler: H) -> Self
    where
        N: Notification,
        H: NotificationHandler<N> + 'static,
    {
        self.registry.add_notification_handler::<N>(Arc::new(handler));
        self
    }

    /// Register one behavior instance around both requests and notifications.
    pub fn behavior<B: Behavior + 'static>(mut self, behavior: B) -> Self {
        let behavior: Arc<dyn Behavior> = Arc::new(behavior);
        self.registry.add_request_behavior(Arc::clone(&behavior));
        self.registry.add_notification_behavior(behavior);
        self
    }

    pub fn request_behavior<B: Behavior + 'static>(mut self, behavior: B) -> Self {
        self.registry.add_request_behavior(Arc::new(behavior));
        self
    }

    pub fn request_behavior_for<R, B>(mut self, behavior: B) -> Self
    where
        R: Request,
        B: PipelineBehavior<R> + 'static,
    {
        self.registry.add_request_behavior_for::<R>(Arc::new(behavior));
        self
    }

    pub fn notification_behavior<B: Behavior + 'static>(mut self, behavior: B) -> Self {
        self.registry.add_notification_behavior(Arc::new(behavior));
        self
    }

    pub fn notification_behavior_for<N, B>(mut self, behavior: B) -> Self
    where
        N: Notification,
        B: NotificationBehavior<N> + 'static,
    {
        self.registry.add_notification_behavior_for::<N>(Arc::new(behavior));
        self
    }

    pub fn configure<M: Message>(mut self, settings: MessageSettings) -> Self {
        self.registry.configure::<M>(settings);
        self
    }

    /// Exception, logging and timeout around requests; timeout and exception
    /// around notifications.
    pub fn with_core_behaviors(self) -> Self {
        let timeout = self.options.default_timeout;
        self.request_behavior(ExceptionBehavior)
            .request_behavior(LoggingBehavior)
            .request_behavior(TimeoutBehavior::new(timeout))
            .notification_behavior(TimeoutBehavior::new(timeout))
            .notification_behavior(ExceptionBehavior)
    }

    /// Performance, retry and circuit breaker around requests; the same plus
    /// logging around notifications. Both share one circuit breaker registry.
    pub fn with_advanced_behaviors(mut self) -> Self {
        let settings = self.options.circuit_breaker;
        let breakers = Arc::clone(
            self.circuit_breakers
                .get_or_insert_with(|| Arc::new(CircuitBreakerRegistry::new(settings))),
        );
        let threshold = self.options.performance_threshold;
        let retry = self.options.retry;

        self.request_behavior(PerformanceBehavior::new(threshold))
            .request_behavior(RetryBehavior::new(retry))
            .request_behavior(CircuitBreakerBehavior::with_registry(Arc::clone(&breakers)))
            .notification_behavior(PerformanceBehavior::new(threshold))
            .notification_behavior(RetryBehavior::new(retry))
            .notification_behavior(CircuitBreakerBehavior::with_registry(breakers))
            .notification_behavior(LoggingBehavior)
    }

    pub fn with_default_behaviors(self) -> Self {
        self.with_core_behaviors().with_advanced_behaviors()
    }

    pub fn build(self) -> Dispatcher {
        info!(
            request_behaviors = self.registry.request_behavior_count(),
            notification_behaviors = self.registry.notification_behavior_count(),
            publish_strategy = %self.options.publish_strategy,
            cache_pipelines = self.options.cache_pipelines,
            "Dispatcher built"
        );

        let mut dispatcher = Dispatcher::new(self.registry, self.options);
        dispatcher.circuit_breakers = self.circuit_breakers;
        dispatcher
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
