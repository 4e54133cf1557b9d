use crate::behavior::PipelineBehavior;
use crate::error::Result;
use crate::message::Request;
use crate::pipeline::Next;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs before the handler of request `R`.
#[async_trait]
pub trait PreProcessor<R: Request>: Send + Sync {
    async fn process(&self, request: &R, token: CancellationToken) -> Result<()>;
}

/// Runs after the handler of request `R` succeeded.
#[async_trait]
pub trait PostProcessor<R: Request>: Send + Sync {
    async fn process(&self, request: &R, response: &R::Response, token: CancellationToken) -> Result<()>;
}

/// Pre-processors in registration order, the rest of the pipeline, then
/// post-processors in registration order. The first failure stops the chain.
pub struct PrePostProcessorBehavior<R: Request> {
    pre: Vec<Arc<dyn PreProcessor<R>>>,
    post: Vec<Arc<dyn PostProcessor<R>>>,
}

impl<R: Request> PrePostProcessorBehavior<R> {
    pub fn new() -> Self {
        Self {
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    pub fn pre(mut self, processor: impl PreProcessor<R> + 'static) -> Self {
        self.pre.push(Arc::new(processor));
        self
    }

    pub fn post(mut self, processor: impl PostProcessor<R> + 'static) -> Self {
        self.post.push(Arc::new(processor));
        self
    }
}

impl<R: Request> Default for PrePostProcessorBehavior<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Request> PipelineBehavior<R> for PrePostProcessorBehavior<R> {
    async fn handle(&self, request: &R, next: Next<'_, R::Response>, token: CancellationToken) -> Result<R::Response> {
        for processor in &self.pre {
            processor.process(request, token.clone()).await?;
        }

        let response = next.run(token.clone()).await?;

        for processor in &self.post {
            processor.process(request, &response, token.clone()).await?;
        }
        Ok(response)
    }
}
