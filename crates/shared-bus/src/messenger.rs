//! # Restricted Messenger
//!
//! The only view of the bus a controller receives. Foreign actions and
//! events must be allow-listed; everything under the messenger's own
//! namespace is implicitly permitted.

use crate::actions::{ActionHandler, BusAction};
use crate::error::BusError;
use crate::events::{namespace_of, BusEvent};
use crate::publisher::{EventHandler, EventPublisher, MessageBus, SubscriptionId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Allow-list for a restricted messenger.
#[derive(Debug, Clone, Default)]
pub struct RestrictedConfig {
    /// Namespace owned by the messenger, e.g. `TokensController`.
    pub name: &'static str,
    /// Foreign actions the messenger may call.
    pub allowed_actions: Vec<&'static str>,
    /// Foreign events the messenger may subscribe to.
    pub allowed_events: Vec<&'static str>,
}

impl RestrictedConfig {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn allow_actions(mut self, actions: &[&'static str]) -> Self {
        self.allowed_actions.extend_from_slice(actions);
        self
    }

    #[must_use]
    pub fn allow_events(mut self, events: &[&'static str]) -> Self {
        self.allowed_events.extend_from_slice(events);
        self
    }
}

/// A namespaced, allow-listed view of a [`MessageBus`].
pub struct RestrictedMessenger<E: BusEvent, A: BusAction> {
    bus: Arc<MessageBus<E, A>>,
    name: &'static str,
    allowed_actions: HashSet<&'static str>,
    allowed_events: HashSet<&'static str>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl<E: BusEvent, A: BusAction> RestrictedMessenger<E, A> {
    pub(crate) fn new(bus: Arc<MessageBus<E, A>>, config: RestrictedConfig) -> Self {
        Self {
            bus,
            name: config.name,
            allowed_actions: config.allowed_actions.into_iter().collect(),
            allowed_events: config.allowed_events.into_iter().collect(),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn owns(&self, identifier: &str) -> bool {
        namespace_of(identifier) == Some(self.name)
    }

    /// Call an action. Foreign actions must be allow-listed.
    pub async fn call(&self, action: A) -> Result<A::Output, A::Error> {
        let action_type = action.action_type();
        if !self.owns(action_type) && !self.allowed_actions.contains(action_type) {
            warn!(messenger = self.name, action = action_type, "Action call refused");
            return Err(BusError::ActionNotAllowed {
                messenger: self.name.to_string(),
                action: action_type.to_string(),
            }
            .into());
        }
        self.bus.call(action).await
    }

    /// Subscribe a handler. Foreign events must be allow-listed.
    pub fn subscribe(
        &self,
        event_type: &'static str,
        handler: EventHandler<E>,
    ) -> Result<SubscriptionId, BusError> {
        if !self.owns(event_type) && !self.allowed_events.contains(event_type) {
            return Err(BusError::EventNotAllowed {
                messenger: self.name.to_string(),
                event: event_type.to_string(),
            });
        }
        let id = self.bus.subscribe(event_type, handler);
        self.subscriptions.lock().push(id);
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.lock().retain(|sid| *sid != id);
        self.bus.unsubscribe(id)
    }

    /// Drop every subscription made through this messenger.
    pub fn clear_subscriptions(&self) {
        let ids: Vec<SubscriptionId> = std::mem::take(&mut *self.subscriptions.lock());
        for id in ids {
            self.bus.unsubscribe(id);
        }
    }

    /// Publish an event owned by this messenger's namespace.
    pub fn publish(&self, event: E) -> Result<usize, BusError> {
        let event_type = event.event_type();
        if !self.owns(event_type) {
            return Err(BusError::ForeignNamespace {
                messenger: self.name.to_string(),
                name: event_type.to_string(),
            });
        }
        Ok(self.bus.publish(event))
    }

    /// Register the handler for one of this namespace's actions.
    pub fn register_action_handler(
        &self,
        action_type: &'static str,
        handler: Arc<dyn ActionHandler<A>>,
    ) -> Result<(), BusError> {
        if !self.owns(action_type) {
            return Err(BusError::ForeignNamespace {
                messenger: self.name.to_string(),
                name: action_type.to_string(),
            });
        }
        self.bus.register_action_handler(action_type, handler)
    }

    #[must_use]
    pub fn is_action_allowed(&self, action_type: &str) -> bool {
        self.owns(action_type) || self.allowed_actions.contains(action_type)
    }
}
