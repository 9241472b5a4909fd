//! # Bus Events
//!
//! The bus is generic over the event enum carried on it. An event type is
//! identified by its `Namespace:name` string, and the namespace is the
//! controller that owns (and alone may publish) the event.

use crate::NAMESPACE_SEPARATOR;
use std::fmt::Debug;

/// An event that can be published on the bus.
pub trait BusEvent: Clone + Debug + Send + Sync + 'static {
    /// Fully-qualified type of this event, e.g. `KeyringController:unlock`.
    fn event_type(&self) -> &'static str;

    /// Every event type this enum can produce.
    fn catalog() -> &'static [&'static str];

    /// Namespace of the publishing controller.
    fn namespace(&self) -> &'static str {
        let event_type = self.event_type();
        event_type
            .split_once(NAMESPACE_SEPARATOR)
            .map_or(event_type, |(ns, _)| ns)
    }
}

/// Namespace part of a `Namespace:name` identifier, if well-formed.
#[must_use]
pub fn namespace_of(name: &str) -> Option<&str> {
    let (ns, rest) = name.split_once(NAMESPACE_SEPARATOR)?;
    if ns.is_empty() || rest.is_empty() || rest.contains(NAMESPACE_SEPARATOR) {
        return None;
    }
    Some(ns)
}

/// Filter for stream subscriptions.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Event types to include (empty = all).
    pub event_types: Vec<String>,
    /// Publishing namespaces to include (empty = all).
    pub namespaces: Vec<String>,
}

impl EventFilter {
    /// Create a filter that matches all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific event types.
    #[must_use]
    pub fn event_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_types: types.into_iter().map(Into::into).collect(),
            namespaces: Vec::new(),
        }
    }

    /// Create a filter for every event of the given namespaces.
    #[must_use]
    pub fn namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_types: Vec::new(),
            namespaces: namespaces.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches<E: BusEvent>(&self, event: &E) -> bool {
        let type_match = self.event_types.is_empty()
            || self.event_types.iter().any(|t| t == event.event_type());

        let namespace_match =
            self.namespaces.is_empty() || self.namespaces.iter().any(|n| n == event.namespace());

        type_match && namespace_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestEvent;

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::all();
        assert!(filter.matches(&TestEvent::Ping(1)));
        assert!(filter.matches(&TestEvent::Pong(1)));
    }

    #[test]
    fn test_filter_by_type() {
        let filter = EventFilter::event_types(["Pinger:ping"]);
        assert!(filter.matches(&TestEvent::Ping(1)));
        assert!(!filter.matches(&TestEvent::Pong(1)));
    }

    #[test]
    fn test_filter_by_namespace() {
        let filter = EventFilter::namespaces(["Ponger"]);
        assert!(!filter.matches(&TestEvent::Ping(1)));
        assert!(filter.matches(&TestEvent::Pong(1)));
    }

    #[test]
    fn test_event_namespace() {
        assert_eq!(TestEvent::Ping(0).namespace(), "Pinger");
    }
}
