//! Shared messages, handlers and behaviors for the dispatch-core test suites
#![allow(dead_code)]

use async_trait::async_trait;
use dispatch_core::{
    Behavior, DispatchError, Message, MessageContext, Next, Notification, NotificationHandler,
    Payload, PipelineBehavior, Request, RequestHandler, Result,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ordered log shared between handlers and behaviors.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

pub struct Ping {
    pub message: String,
}

impl Ping {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl Message for Ping {}
impl Request for Ping {
    type Response = String;
}

/// A request whose handler sleeps for `delay`.
pub struct Sleep {
    pub delay: Duration,
}

impl Message for Sleep {}
impl Request for Sleep {
    type Response = ();
}

/// A request that carries its own timeout.
pub struct Deadline {
    pub delay: Duration,
    pub limit: Duration,
}

impl Message for Deadline {
    fn timeout(&self) -> Option<dispatch_core::TimeoutPolicy> {
        Some(dispatch_core::TimeoutPolicy::After(self.limit))
    }
}
impl Request for Deadline {
    type Response = ();
}

pub struct Charge {
    pub amount: i64,
}

impl Message for Charge {}
impl Request for Charge {
    type Response = u64;
}

pub struct OrderPlaced {
    pub order_id: u64,
}

impl Message for OrderPlaced {}
impl Notification for OrderPlaced {}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

pub struct PingHandler {
    pub journal: Journal,
}

#[async_trait]
impl RequestHandler<Ping> for PingHandler {
    async fn handle(&self, request: &Ping, _token: CancellationToken) -> Result<String> {
        self.journal.push("H");
        Ok(format!("pong: {}", request.message))
    }
}

pub struct SleepHandler {
    pub calls: Counter,
}

#[async_trait]
impl RequestHandler<Sleep> for SleepHandler {
    async fn handle(&self, request: &Sleep, _token: CancellationToken) -> Result<()> {
        self.calls.incr();
        tokio::time::sleep(request.delay).await;
        Ok(())
    }
}

pub struct DeadlineHandler;

#[async_trait]
impl RequestHandler<Deadline> for DeadlineHandler {
    async fn handle(&self, request: &Deadline, _token: CancellationToken) -> Result<()> {
        tokio::time::sleep(request.delay).await;
        Ok(())
    }
}

/// Plays back a script of outcomes, `true` succeeds; an empty script succeeds.
pub struct ScriptedCharge {
    pub script: Mutex<VecDeque<bool>>,
    pub calls: Counter,
}

impl ScriptedCharge {
    pub fn new(script: &[bool], calls: Counter) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            calls,
        }
    }

    /// Fails `failures` times, then succeeds.
    pub fn failing(failures: usize, calls: Counter) -> Self {
        Self::new(&vec![false; failures], calls)
    }
}

#[async_trait]
impl RequestHandler<Charge> for ScriptedCharge {
    async fn handle(&self, request: &Charge, _token: CancellationToken) -> Result<u64> {
        let call = self.calls.incr();
        let succeed = self.script.lock().pop_front().unwrap_or(true);
        if succeed {
            Ok(request.amount as u64)
        } else {
            Err(anyhow::anyhow!("payment gateway unavailable (call {})", call).into())
        }
    }
}

/// Notification handler with an explicit name and priority.
pub struct RecordingHandler {
    pub label: &'static str,
    pub priority: i32,
    pub journal: Journal,
    pub delay: Duration,
    pub fail: bool,
}

impl RecordingHandler {
    pub fn new(label: &'static str, journal: &Journal) -> Self {
        Self {
            label,
            priority: 0,
            journal: journal.clone(),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl NotificationHandler<OrderPlaced> for RecordingHandler {
    async fn handle(&self, _notification: &OrderPlaced, _token: CancellationToken) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            self.journal.push(format!("{} failed", self.label));
            return Err(anyhow::anyhow!("{} failed", self.label).into());
        }
        self.journal.push(self.label);
        Ok(())
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

// ----------------------------------------------------------------------------
// Behaviors
// ----------------------------------------------------------------------------

/// Open behavior writing "<name> before" / "<name> after" around downstream.
pub struct Tag {
    pub name: &'static str,
    pub journal: Journal,
}

impl Tag {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl Behavior for Tag {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        match ctx.handler {
            Some(handler) => self.journal.push(format!("{} before {}", self.name, handler)),
            None => self.journal.push(format!("{} before", self.name)),
        }
        let result = next.run(token).await;
        self.journal.push(format!("{} after", self.name));
        result
    }
}

/// Typed behavior for [`Ping`] with the same journal format as [`Tag`].
pub struct PingTag {
    pub name: &'static str,
    pub journal: Journal,
}

#[async_trait]
impl PipelineBehavior<Ping> for PingTag {
    async fn handle(&self, _request: &Ping, next: Next<'_, String>, token: CancellationToken) -> Result<String> {
        self.journal.push(format!("{} before", self.name));
        let result = next.run(token).await;
        self.journal.push(format!("{} after", self.name));
        result
    }
}

/// Open behavior that never calls downstream.
pub struct Reject;

#[async_trait]
impl Behavior for Reject {
    async fn handle(&self, ctx: &MessageContext, _next: Next<'_, Payload>, _token: CancellationToken) -> Result<Payload> {
        Err(anyhow::anyhow!("{} rejected", ctx.message_type).into())
    }
}

/// Open behavior that swaps the response for a value of the wrong type.
pub struct WrongPayload;

#[async_trait]
impl Behavior for WrongPayload {
    async fn handle(&self, _ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        next.run(token).await?;
        Ok(Box::new(7u8))
    }
}

pub fn is_handler_error(err: &DispatchError) -> bool {
    matches!(err, DispatchError::Handler(_))
}
