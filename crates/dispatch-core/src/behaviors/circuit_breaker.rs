//! Circuit Breaker - per-message-type failure tracking
//!
//! Each message type gets its own circuit. The circuit opens once the number
//! of consecutive failures reaches the threshold and a success resets the
//! count. Without a break duration an open circuit stays open until it is
//! reset; with one, it admits a single trial call after the break and closes
//! or reopens depending on the outcome.

use crate::behavior::{Behavior, Payload};
use crate::error::{DispatchError, Result};
use crate::message::{Message, MessageContext};
use crate::options::CircuitBreakerSettings;
use crate::pipeline::Next;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitStats {
    pub message_type: &'static str,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
}

struct TypeCircuit {
    message_type: &'static str,
    state: RwLock<CircuitState>,
    consecutive_failures: AtomicU32,
    opened_at: RwLock<Option<Instant>>,
    trial_in_flight: AtomicBool,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    rejected_calls: AtomicU64,
}

impl TypeCircuit {
    fn new(message_type: &'static str) -> Self {
        Self {
            message_type,
            state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            opened_at: RwLock::new(None),
            trial_in_flight: AtomicBool::new(false),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
        }
    }

    fn allow_request(&self, threshold: u32, break_duration: Option<Duration>) -> bool {
        let mut state = self.state.write();
        match *state {
            CircuitState::Closed => {
                // A threshold lowered after failures were counted still opens the circuit
                if self.consecutive_failures.load(Ordering::SeqCst) >= threshold {
                    *state = CircuitState::Open;
                    *self.opened_at.write() = Some(Instant::now());
                    warn!(message_type = self.message_type, threshold, "Circuit breaker opened");
                    return false;
                }
                true
            }
            CircuitState::Open => {
                let elapsed = self.opened_at.read().map(|at| at.elapsed());
                match (break_duration, elapsed) {
                    (Some(limit), Some(elapsed)) if elapsed >= limit => {
                        *state = CircuitState::HalfOpen;
                        self.trial_in_flight.store(true, Ordering::SeqCst);
                        info!(message_type = self.message_type, "Circuit breaker half-open, allowing trial call");
                        true
                    }
                    _ => false,
                }
            }
            CircuitState::HalfOpen => self
                .trial_in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok(),
        }
    }

    fn record_success(&self) {
        self.successful_calls.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.trial_in_flight.store(false, Ordering::SeqCst);

        let mut state = self.state.write();
        if *state != CircuitState::Closed {
            *state = CircuitState::Closed;
            *self.opened_at.write() = None;
            info!(message_type = self.message_type, "Circuit breaker closed after successful call");
        }
    }

    fn record_failure(&self, threshold: u32) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        self.trial_in_flight.store(false, Ordering::SeqCst);

        let mut state = self.state.write();
        match *state {
            CircuitState::Closed if failures >= threshold => {
                *state = CircuitState::Open;
                *self.opened_at.write() = Some(Instant::now());
                warn!(message_type = self.message_type, failures, "Circuit breaker opened after {} failures", failures);
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.opened_at.write() = Some(Instant::now());
                warn!(message_type = self.message_type, "Circuit breaker re-opened on failure in half-open state");
            }
            _ => {}
        }
    }

    /// A call ended without an outcome. A half-open trial gives its slot back
    /// and the circuit waits out another break.
    fn record_abandoned(&self) {
        self.trial_in_flight.store(false, Ordering::SeqCst);

        let mut state = self.state.write();
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.opened_at.write() = Some(Instant::now());
            info!(message_type = self.message_type, "Circuit breaker trial abandoned, re-opened");
        }
    }

    fn record_rejected(&self) {
        self.rejected_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> CircuitStats {
        CircuitStats {
            message_type: self.message_type,
            state: *self.state.read(),
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        *self.state.write() = CircuitState::Closed;
        *self.opened_at.write() = None;
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.trial_in_flight.store(false, Ordering::SeqCst);
    }
}

/// Circuits for every message type seen by one breaker behavior.
pub struct CircuitBreakerRegistry {
    circuits: RwLock<HashMap<TypeId, Arc<TypeCircuit>>>,
    settings: CircuitBreakerSettings,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &CircuitBreakerSettings {
        &self.settings
    }

    fn get_or_create(&self, type_id: TypeId, message_type: &'static str) -> Arc<TypeCircuit> {
        {
            let circuits = self.circuits.read();
            if let Some(circuit) = circuits.get(&type_id) {
                return Arc::clone(circuit);
            }
        }

        let mut circuits = self.circuits.write();
        Arc::clone(
            circuits
                .entry(type_id)
                .or_insert_with(|| Arc::new(TypeCircuit::new(message_type))),
        )
    }

    /// Check whether a call for this message type may proceed.
    pub fn allow_request(&self, ctx: &MessageContext) -> bool {
        let circuit = self.get_or_create(ctx.type_id, ctx.message_type);
        let allowed = circuit.allow_request(self.threshold_for(ctx), self.settings.break_duration);
        if !allowed {
            circuit.record_rejected();
        }
        allowed
    }

    pub fn record_success(&self, ctx: &MessageContext) {
        self.get_or_create(ctx.type_id, ctx.message_type).record_success();
    }

    pub fn record_failure(&self, ctx: &MessageContext) {
        self.get_or_create(ctx.type_id, ctx.message_type)
            .record_failure(self.threshold_for(ctx));
    }

    /// Record a call that was cancelled or dropped before it produced a result.
    pub fn record_abandoned(&self, ctx: &MessageContext) {
        self.get_or_create(ctx.type_id, ctx.message_type).record_abandoned();
    }

    fn threshold_for(&self, ctx: &MessageContext) -> u32 {
        ctx.failure_threshold.unwrap_or(self.settings.failure_threshold)
    }

    pub fn state<M: Message>(&self) -> Option<CircuitState> {
        let circuits = self.circuits.read();
        circuits.get(&TypeId::of::<M>()).map(|c| *c.state.read())
    }

    pub fn stats<M: Message>(&self) -> Option<CircuitStats> {
        let circuits = self.circuits.read();
        circuits.get(&TypeId::of::<M>()).map(|c| c.stats())
    }

    pub fn all_stats(&self) -> Vec<CircuitStats> {
        let circuits = self.circuits.read();
        let mut stats: Vec<CircuitStats> = circuits.values().map(|c| c.stats()).collect();
        stats.sort_by(|a, b| a.message_type.cmp(b.message_type));
        stats
    }

    /// Reset the circuit of message type `M`. Returns false if it was never used.
    pub fn reset<M: Message>(&self) -> bool {
        let circuits = self.circuits.read();
        if let Some(circuit) = circuits.get(&TypeId::of::<M>()) {
            circuit.reset();
            info!(message_type = circuit.message_type, "Circuit breaker reset");
            true
        } else {
            false
        }
    }

    pub fn reset_all(&self) {
        let circuits = self.circuits.read();
        for circuit in circuits.values() {
            circuit.reset();
        }
    }

    pub fn open_count(&self) -> usize {
        let circuits = self.circuits.read();
        circuits
            .values()
            .filter(|c| *c.state.read() == CircuitState::Open)
            .count()
    }
}

/// Fails fast with [`DispatchError::CircuitOpen`] while a message type's circuit is open.
pub struct CircuitBreakerBehavior {
    registry: Arc<CircuitBreakerRegistry>,
}

impl CircuitBreakerBehavior {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self::with_registry(Arc::new(CircuitBreakerRegistry::new(settings)))
    }

    pub fn with_registry(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> Arc<CircuitBreakerRegistry> {
        Arc::clone(&self.registry)
    }
}

impl Default for CircuitBreakerBehavior {
    fn default() -> Self {
        Self::new(CircuitBreakerSettings::default())
    }
}

/// Outcome tracking for one admitted call.
///
/// Dropped without [`InFlightCall::settle`] means an outer timeout or a caller
/// cancellation discarded the call: the former counts as a failure, the
/// latter as abandoned.
struct InFlightCall<'a> {
    registry: &'a CircuitBreakerRegistry,
    ctx: &'a MessageContext,
    token: CancellationToken,
    settled: bool,
}

impl<'a> InFlightCall<'a> {
    fn new(registry: &'a CircuitBreakerRegistry, ctx: &'a MessageContext, token: CancellationToken) -> Self {
        Self {
            registry,
            ctx,
            token,
            settled: false,
        }
    }

    fn settle(mut self, result: &Result<Payload>) {
        self.settled = true;
        match result {
            Ok(_) => self.registry.record_success(self.ctx),
            // Caller cancellation says nothing about the handler's health
            Err(e) if e.is_cancelled() => self.registry.record_abandoned(self.ctx),
            Err(_) => self.registry.record_failure(self.ctx),
        }
    }
}

impl Drop for InFlightCall<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self.token.is_cancelled() {
            self.registry.record_abandoned(self.ctx);
        } else {
            warn!(
                message_type = self.ctx.message_type,
                handler = self.ctx.handler,
                "Call dropped before completing, counted as failure"
            );
            self.registry.record_failure(self.ctx);
        }
    }
}

#[async_trait]
impl Behavior for CircuitBreakerBehavior {
    async fn handle(&self, ctx: &MessageContext, next: Next<'_, Payload>, token: CancellationToken) -> Result<Payload> {
        if !self.registry.allow_request(ctx) {
            return Err(DispatchError::CircuitOpen {
                message_type: ctx.message_type,
            });
        }

        let call = InFlightCall::new(&self.registry, ctx, token.clone());
        let result = next.run(token).await;
        call.settle(&result);
        result
    }
}
