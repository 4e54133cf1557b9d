//! Validation behavior
//!
//! Runs every registered validator concurrently and fails the dispatch with
//! all collected failures before the handler is reached.

use crate::behavior::{NotificationBehavior, PipelineBehavior};
use crate::error::{Result, ValidationError, ValidationFailure};
use crate::message::{Message, Notification, Request};
use crate::pipeline::Next;
use async_trait::async_trait;
use dispatch_common::short_type_name;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Checks one message type; an empty result means valid.
#[async_trait]
pub trait Validator<M: Message>: Send + Sync {
    async fn validate(&self, message: &M) -> Vec<ValidationFailure>;
}

pub struct ValidationBehavior<M: Message> {
    validators: Vec<Arc<dyn Validator<M>>>,
}

impl<M: Message> ValidationBehavior<M> {
    pub fn new(validators: Vec<Arc<dyn Validator<M>>>) -> Self {
        Self { validators }
    }

    pub fn with_validator(mut self, validator: impl Validator<M> + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    async fn check(&self, message: &M) -> Result<()> {
        if self.validators.is_empty() {
            return Ok(());
        }

        let failures: Vec<ValidationFailure> = join_all(self.validators.iter().map(|v| v.validate(message)))
            .await
            .into_iter()
            .flatten()
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        warn!(
            message_type = short_type_name::<M>(),
            failures = failures.len(),
            "Validation failed"
        );
        Err(ValidationError {
            message_type: short_type_name::<M>(),
            failures,
        }
        .into())
    }
}

impl<M: Message> Default for ValidationBehavior<M> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl<R: Request> PipelineBehavior<R> for ValidationBehavior<R> {
    async fn handle(&self, request: &R, next: Next<'_, R::Response>, token: CancellationToken) -> Result<R::Response> {
        self.check(request).await?;
        next.run(token).await
    }
}

#[async_trait]
impl<N: Notification> NotificationBehavior<N> for ValidationBehavior<N> {
    async fn handle(&self, notification: &N, next: Next<'_, ()>, token: CancellationToken) -> Result<()> {
        self.check(notification).await?;
        next.run(token).await
    }
}
