//! Handler Registry - typed storage for handlers, behaviors and per-type settings
//!
//! Entries are keyed by the message's `TypeId`. Every behavior registration
//! takes a sequence number from one shared counter so open and typed behaviors
//! resolve in the order they were registered.

use crate::behavior::{Behavior, NotificationBehavior, PipelineBehavior};
use crate::handler::{NotificationHandler, RequestHandler};
use crate::message::{Message, MessageSettings, Notification, Request};
use crate::pipeline::{NotificationLayer, RequestLayer};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type Slots = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

struct RequestEntry<R: Request> {
    handlers: Vec<Arc<dyn RequestHandler<R>>>,
    behaviors: Vec<(u64, Arc<dyn PipelineBehavior<R>>)>,
}

impl<R: Request> Default for RequestEntry<R> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            behaviors: Vec::new(),
        }
    }
}

struct NotificationEntry<N: Notification> {
    handlers: Vec<Arc<dyn NotificationHandler<N>>>,
    behaviors: Vec<(u64, Arc<dyn NotificationBehavior<N>>)>,
}

impl<N: Notification> Default for NotificationEntry<N> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            behaviors: Vec::new(),
        }
    }
}

fn slot_mut<E>(slots: &mut Slots, key: TypeId) -> Option<&mut E>
where
    E: Default + Send + Sync + 'static,
{
    let entry = slots.entry(key).or_insert_with(|| Box::new(E::default()));
    entry.downcast_mut::<E>()
}

fn slot<E: 'static>(slots: &Slots, key: TypeId) -> Option<&E> {
    slots.get(&key).and_then(|entry| entry.downcast_ref::<E>())
}

/// Registry of everything the dispatcher can resolve.
///
/// Populated at startup and then handed to the dispatcher, which only reads it.
#[derive(Default)]
pub struct HandlerRegistry {
    requests: Slots,
    notifications: Slots,
    request_behaviors: Vec<(u64, Arc<dyn Behavior>)>,
    notification_behaviors: Vec<(u64, Arc<dyn Behavior>)>,
    settings: HashMap<TypeId, MessageSettings>,
    sequence: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn add_request_handler<R: Request>(&mut self, handler: Arc<dyn RequestHandler<R>>) {
        if let Some(entry) = slot_mut::<RequestEntry<R>>(&mut self.requests, TypeId::of::<R>()) {
            entry.handlers.push(handler);
            debug!(
                request_type = dispatch_common::short_type_name::<R>(),
                handlers = entry.handlers.len(),
                "Registered request handler"
            );
        }
    }

    pub fn add_notification_handler<N: Notification>(&mut self, handler: Arc<dyn NotificationHandler<N>>) {
        if let Some(entry) = slot_mut::<NotificationEntry<N>>(&mut self.notifications, TypeId::of::<N>()) {
            debug!(
                notification_type = dispatch_common::short_type_name::<N>(),
                handler = handler.name(),
                priority = handler.priority(),
                "Registered notification handler"
            );
            entry.handlers.push(handler);
        }
    }

    /// Register a behavior around every request type.
    pub fn add_request_behavior(&mut self, behavior: Arc<dyn Behavior>) {
        let seq = self.next_sequence();
        self.request_behaviors.push((seq, behavior));
    }

    /// Register a behavior around request type `R` only.
    pub fn add_request_behavior_for<R: Request>(&mut self, behavior: Arc<dyn PipelineBehavior<R>>) {
        let seq = self.next_sequence();
        if let Some(entry) = slot_mut::<RequestEntry<R>>(&mut self.requests, TypeId::of::<R>()) {
            entry.behaviors.push((seq, behavior));
        }
    }

    /// Register a behavior around every notification type.
    pub fn add_notification_behavior(&mut self, behavior: Arc<dyn Behavior>) {
        let seq = self.next_sequence();
        self.notification_behaviors.push((seq, behavior));
    }

    /// Register a behavior around notification type `N` only.
    pub fn add_notification_behavior_for<N: Notification>(&mut self, behavior: Arc<dyn NotificationBehavior<N>>) {
        let seq = self.next_sequence();
        if let Some(entry) = slot_mut::<NotificationEntry<N>>(&mut self.notifications, TypeId::of::<N>()) {
            entry.behaviors.push((seq, behavior));
        }
    }

    /// Set the per-type metadata for message type `M`, replacing earlier settings.
    pub fn configure<M: Message>(&mut self, settings: MessageSettings) {
        self.settings.insert(TypeId::of::<M>(), settings);
    }

    pub fn settings<M: Message>(&self) -> Option<&MessageSettings> {
        self.settings.get(&TypeId::of::<M>())
    }

    /// Request handlers for `R` in registration order.
    pub fn request_handlers<R: Request>(&self) -> Vec<Arc<dyn RequestHandler<R>>> {
        slot::<RequestEntry<R>>(&self.requests, TypeId::of::<R>())
            .map(|entry| entry.handlers.clone())
            .unwrap_or_default()
    }

    /// Open and typed behaviors for `R`, merged in registration order.
    pub fn request_layers<R: Request>(&self) -> Vec<RequestLayer<R>> {
        let mut layers: Vec<(u64, RequestLayer<R>)> = self
            .request_behaviors
            .iter()
            .map(|(seq, b)| (*seq, RequestLayer::Open(Arc::clone(b))))
            .collect();

        if let Some(entry) = slot::<RequestEntry<R>>(&self.requests, TypeId::of::<R>()) {
            layers.extend(
                entry
                    .behaviors
                    .iter()
                    .map(|(seq, b)| (*seq, RequestLayer::Typed(Arc::clone(b)))),
            );
        }

        layers.sort_by_key(|(seq, _)| *seq);
        layers.into_iter().map(|(_, layer)| layer).collect()
    }

    /// Notification handlers for `N` in registration order.
    pub fn notification_handlers<N: Notification>(&self) -> Vec<Arc<dyn NotificationHandler<N>>> {
        slot::<NotificationEntry<N>>(&self.notifications, TypeId::of::<N>())
            .map(|entry| entry.handlers.clone())
            .unwrap_or_default()
    }

    /// Open and typed behaviors for `N`, merged in registration order.
    pub fn notification_layers<N: Notification>(&self) -> Vec<NotificationLayer<N>> {
        let mut layers: Vec<(u64, NotificationLayer<N>)> = self
            .notification_behaviors
            .iter()
            .map(|(seq, b)| (*seq, NotificationLayer::Open(Arc::clone(b))))
            .collect();

        if let Some(entry) = slot::<NotificationEntry<N>>(&self.notifications, TypeId::of::<N>()) {
            layers.extend(
                entry
                    .behaviors
                    .iter()
                    .map(|(seq, b)| (*seq, NotificationLayer::Typed(Arc::clone(b)))),
            );
        }

        layers.sort_by_key(|(seq, _)| *seq);
        layers.into_iter().map(|(_, layer)| layer).collect()
    }

    pub fn request_behavior_count(&self) -> usize {
        self.request_behaviors.len()
    }

    pub fn notification_behavior_count(&self) -> usize {
        self.notification_behaviors.len()
    }
}
