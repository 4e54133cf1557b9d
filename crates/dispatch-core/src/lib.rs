//! In-process request/notification dispatcher
//!
//! This crate routes messages to handlers registered at startup:
//! - Requests: exactly one handler, one response (possibly `()`)
//! - Notifications: zero or more handlers, executed sequentially or in parallel
//! - Behaviors: ordered wrappers around every dispatch (logging, timeout, retry,
//!   circuit breaker, validation, ...), first registered runs outermost
//!
//! # Example
//!
//! ```rust,ignore
//! use dispatch_core::{Dispatcher, Message, Request, RequestHandler, Result};
//!
//! struct CreateOrder { sku: String }
//! impl Message for CreateOrder {}
//! impl Request for CreateOrder { type Response = u64; }
//!
//! struct CreateOrderHandler;
//!
//! #[async_trait::async_trait]
//! impl RequestHandler<CreateOrder> for CreateOrderHandler {
//!     async fn handle(&self, req: &CreateOrder, _token: CancellationToken) -> Result<u64> {
//!         Ok(42)
//!     }
//! }
//!
//! let dispatcher = Dispatcher::builder()
//!     .with_default_behaviors()
//!     .request_handler(CreateOrderHandler)
//!     .build();
//!
//! let id = dispatcher.send(&CreateOrder { sku: "A-1".into() }).await?;
//! ```

pub mod behavior;
pub mod behaviors;
pub mod dispatcher;
pub mod error;
mod fanout;
pub mod handler;
pub mod message;
pub mod options;
pub mod pipeline;
pub mod registry;

pub use behavior::{Behavior, NotificationBehavior, Payload, PipelineBehavior};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{
    DispatchError, HandlerFailure, PublishError, Result, ValidationError, ValidationFailure,
};
pub use handler::{NotificationHandler, RequestHandler, WithPriority};
pub use message::{
    Message, MessageContext, MessageSettings, Notification, Request, RetryPolicy, TimeoutPolicy,
};
pub use options::{CircuitBreakerSettings, DispatcherOptions};
pub use pipeline::{compose, continuation, Continuation, Next, NotificationLayer, RequestLayer};
pub use registry::HandlerRegistry;

pub use dispatch_common::{MessageKind, PublishStrategy};
pub use tokio_util::sync::CancellationToken;
