use crate::behavior::{Behavior, Payload};
use crate::error::Result;
use crate::message::MessageContext;
use crate::pipeline::Next;
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Records dispatch counts and durations through the `metrics` facade.
///
/// - `dispatcher_messages_total{message_type, kind, outcome}`
/// - `dispatcher_duration_seconds{message_type, kind}`
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsBehavior;

#[async_trait]
impl Behavior for MetricsBehavior {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        let start = Instant::now();
        let result = next.run(token).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        counter!(
            "dispatcher_messages_total",
            "message_type" => ctx.message_type,
            "kind" => ctx.kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(
            "dispatcher_duration_seconds",
            "message_type" => ctx.message_type,
            "kind" => ctx.kind.as_str()
        )
        .record(start.elapsed().as_secs_f64());

        result
    }
}
