//! # Message Bus
//!
//! Defines the publishing side of the bus and the action registry.

use crate::actions::{ActionHandler, BusAction};
use crate::error::BusError;
use crate::events::{namespace_of, BusEvent, EventFilter};
use crate::messenger::{RestrictedConfig, RestrictedMessenger};
use crate::subscriber::{EventStream, Subscription, SubscriptionGuard};
use crate::DEFAULT_CHANNEL_CAPACITY;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Synchronous event callback.
pub type EventHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle identifying one handler subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Trait for publishing events to the bus.
pub trait EventPublisher<E: BusEvent>: Send + Sync {
    /// Publish an event.
    ///
    /// # Returns
    ///
    /// The number of handlers and stream subscribers that received the event.
    fn publish(&self, event: E) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-process message bus.
///
/// Handlers registered with [`MessageBus::subscribe`] run synchronously on
/// the publishing task, in registration order. Stream subscribers receive a
/// clone through `tokio::sync::broadcast`.
pub struct MessageBus<E: BusEvent, A: BusAction> {
    /// Broadcast sender for stream subscribers.
    sender: broadcast::Sender<E>,

    /// Synchronous handlers by event type.
    handlers: RwLock<HashMap<&'static str, Vec<(SubscriptionId, EventHandler<E>)>>>,

    /// Action handlers by action type.
    actions: RwLock<HashMap<&'static str, Arc<dyn ActionHandler<A>>>>,

    /// Active stream subscription count by filter key.
    streams: Arc<RwLock<HashMap<String, usize>>>,

    next_subscription: AtomicU64,

    /// Total events published.
    events_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl<E: BusEvent, A: BusAction> MessageBus<E, A> {
    /// Create a new bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new bus with specified stream capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
            streams: Arc::new(RwLock::new(HashMap::new())),
            next_subscription: AtomicU64::new(1),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Create a messenger restricted to `config`'s allow-lists.
    ///
    /// Every allowed action must already have a registered handler and
    /// every allowed event must be part of the event catalog.
    pub fn restricted(
        self: &Arc<Self>,
        config: RestrictedConfig,
    ) -> Result<RestrictedMessenger<E, A>, BusError> {
        if config.name.is_empty() || config.name.contains(crate::NAMESPACE_SEPARATOR) {
            return Err(BusError::MalformedName(config.name.to_string()));
        }

        for action in &config.allowed_actions {
            namespace_of(action).ok_or_else(|| BusError::MalformedName(action.to_string()))?;
            if !self.has_action_handler(action) {
                return Err(BusError::UnknownAction(action.to_string()));
            }
        }

        let catalog: HashSet<&str> = E::catalog().iter().copied().collect();
        for event in &config.allowed_events {
            namespace_of(event).ok_or_else(|| BusError::MalformedName(event.to_string()))?;
            if !catalog.contains(event) {
                return Err(BusError::UnknownEvent(event.to_string()));
            }
        }

        debug!(
            messenger = config.name,
            actions = config.allowed_actions.len(),
            events = config.allowed_events.len(),
            "Restricted messenger created"
        );

        Ok(RestrictedMessenger::new(Arc::clone(self), config))
    }

    /// Register a synchronous handler for one event type.
    pub fn subscribe(&self, event_type: &'static str, handler: EventHandler<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(event_type)
            .or_default()
            .push((id, handler));
        trace!(event = event_type, "Handler subscribed");
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove every synchronous handler.
    pub fn clear_subscriptions(&self) {
        let mut handlers = self.handlers.write();
        let removed: usize = handlers.values().map(Vec::len).sum();
        handlers.clear();
        debug!(removed, "Bus subscriptions cleared");
    }

    /// Register the handler for an action type.
    pub fn register_action_handler(
        &self,
        action_type: &'static str,
        handler: Arc<dyn ActionHandler<A>>,
    ) -> Result<(), BusError> {
        namespace_of(action_type).ok_or_else(|| BusError::MalformedName(action_type.to_string()))?;
        let mut actions = self.actions.write();
        if actions.contains_key(action_type) {
            return Err(BusError::HandlerAlreadyRegistered(action_type.to_string()));
        }
        actions.insert(action_type, handler);
        trace!(action = action_type, "Action handler registered");
        Ok(())
    }

    pub fn unregister_action_handler(&self, action_type: &str) {
        self.actions.write().remove(action_type);
    }

    /// Remove every action handler.
    pub fn clear_action_handlers(&self) {
        self.actions.write().clear();
    }

    #[must_use]
    pub fn has_action_handler(&self, action_type: &str) -> bool {
        self.actions.read().contains_key(action_type)
    }

    /// Route an action to its handler.
    pub async fn call(&self, action: A) -> Result<A::Output, A::Error> {
        let action_type = action.action_type();
        let handler = self
            .actions
            .read()
            .get(action_type)
            .cloned()
            .ok_or_else(|| BusError::NoHandler(action_type.to_string()))?;
        handler.handle(action).await
    }

    /// Subscribe a stream consumer to events matching a filter.
    #[must_use]
    pub fn stream(&self, filter: EventFilter) -> Subscription<E> {
        let receiver = self.sender.subscribe();
        let key = format!("{:?}/{:?}", filter.event_types, filter.namespaces);

        // Track subscription
        *self.streams.write().entry(key.clone()).or_insert(0) += 1;

        debug!(event_types = ?filter.event_types, "New stream subscription created");

        Subscription::new(receiver, filter, SubscriptionGuard::new(self.streams.clone(), key))
    }

    /// Get a `Stream` of events matching a filter.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream<E> {
        EventStream::new(self.stream(filter))
    }

    /// Number of synchronous handlers across all event types.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Number of active stream subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<E: BusEvent, A: BusAction> Default for MessageBus<E, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent, A: BusAction> EventPublisher<E> for MessageBus<E, A> {
    fn publish(&self, event: E) -> usize {
        let event_type = event.event_type();

        // Always increment counter (event was attempted)
        self.events_published.fetch_add(1, Ordering::Relaxed);

        // Handlers run without the registry lock so they may publish or
        // subscribe themselves.
        let handlers: Vec<EventHandler<E>> = self
            .handlers
            .read()
            .get(event_type)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(&event);
        }

        let streamed = if self.sender.receiver_count() > 0 {
            match self.sender.send(event) {
                Ok(n) => n,
                Err(e) => {
                    warn!(event = event_type, error = %e, "Event dropped (no receivers)");
                    0
                }
            }
        } else {
            0
        };

        let receivers = handlers.len() + streamed;
        debug!(event = event_type, receivers, "Event published");
        receivers
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Doubler, TestAction, TestBus, TestError, TestEvent};
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let bus = TestBus::new();
        let receivers = bus.publish(TestEvent::Ping(1));
        assert_eq!(receivers, 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[tokio::test]
    async fn test_handlers_run_for_matching_type_only() {
        let bus = TestBus::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let counter = pings.clone();
        bus.subscribe(
            "Pinger:ping",
            Arc::new(move |_e: &TestEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(bus.publish(TestEvent::Ping(1)), 1);
        assert_eq!(bus.publish(TestEvent::Pong(1)), 0);
        assert_eq!(pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_clear() {
        let bus = TestBus::new();
        let id = bus.subscribe("Pinger:ping", Arc::new(|_e: &TestEvent| {}));
        bus.subscribe("Ponger:pong", Arc::new(|_e: &TestEvent| {}));
        assert_eq!(bus.handler_count(), 2);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.handler_count(), 1);

        bus.clear_subscriptions();
        assert_eq!(bus.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_call_routes_to_handler() {
        let bus = TestBus::new();
        bus.register_action_handler("Ponger:double", Arc::new(Doubler)).unwrap();

        assert_eq!(bus.call(TestAction::Double(21)).await, Ok(42));
        assert_eq!(
            bus.call(TestAction::Fail).await,
            Err(TestError::Bus(BusError::NoHandler("Ponger:fail".into())))
        );
    }

    #[tokio::test]
    async fn test_duplicate_action_handler_is_refused() {
        let bus = TestBus::new();
        bus.register_action_handler("Ponger:double", Arc::new(Doubler)).unwrap();
        let second = bus.register_action_handler("Ponger:double", Arc::new(Doubler));
        assert!(matches!(second, Err(BusError::HandlerAlreadyRegistered(_))));
    }

    #[test]
    fn test_default_bus() {
        let bus = TestBus::default();
        assert_eq!(bus.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.events_published(), 0);
    }
}
