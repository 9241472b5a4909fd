//! # Shared Bus - Message Bus for Inter-Controller Communication
//!
//! Every controller talks to its peers through this bus. Controllers never
//! hold references to each other; they publish events under their own
//! namespace and call actions registered by other controllers.
//!
//! ## Rules
//!
//! - Names are `Namespace:name` (e.g. `ApprovalController:addRequest`).
//! - A controller only receives a [`RestrictedMessenger`] whose allow-list
//!   names the foreign actions it may call and foreign events it may observe.
//! - Allow-lists are checked when the messenger is created, so a wiring
//!   mistake fails at startup rather than on first use.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Controller A │                    │ Controller B │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!        │               ▼                    ↑
//!        │         ┌──────────────┐          │
//!        │ call()  │ Message Bus  │ ─────────┘
//!        └───────► │              │  subscribe() / handler
//!                  └──────────────┘
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod actions;
pub mod error;
pub mod events;
pub mod messenger;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use actions::{ActionHandler, BusAction};
pub use error::BusError;
pub use events::{namespace_of, BusEvent, EventFilter};
pub use messenger::{RestrictedConfig, RestrictedMessenger};
pub use publisher::{EventHandler, EventPublisher, MessageBus, SubscriptionId};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per stream subscriber before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Separator between namespace and name in bus identifiers.
pub const NAMESPACE_SEPARATOR: char = ':';

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug, Clone, PartialEq)]
    pub enum TestEvent {
        Ping(u32),
        Pong(u32),
    }

    impl BusEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                Self::Ping(_) => "Pinger:ping",
                Self::Pong(_) => "Ponger:pong",
            }
        }

        fn catalog() -> &'static [&'static str] {
            &["Pinger:ping", "Ponger:pong"]
        }
    }

    #[derive(Debug)]
    pub enum TestAction {
        Double(u32),
        Fail,
    }

    #[derive(Debug, PartialEq)]
    pub enum TestError {
        Bus(BusError),
        Failed,
    }

    impl From<BusError> for TestError {
        fn from(e: BusError) -> Self {
            Self::Bus(e)
        }
    }

    impl BusAction for TestAction {
        type Output = u32;
        type Error = TestError;

        fn action_type(&self) -> &'static str {
            match self {
                Self::Double(_) => "Ponger:double",
                Self::Fail => "Ponger:fail",
            }
        }
    }

    pub struct Doubler;

    #[async_trait]
    impl ActionHandler<TestAction> for Doubler {
        async fn handle(&self, action: TestAction) -> Result<u32, TestError> {
            match action {
                TestAction::Double(n) => Ok(n * 2),
                TestAction::Fail => Err(TestError::Failed),
            }
        }
    }

    pub type TestBus = MessageBus<TestEvent, TestAction>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }

    #[test]
    fn test_namespace_split() {
        assert_eq!(namespace_of("ApprovalController:addRequest"), Some("ApprovalController"));
        assert_eq!(namespace_of("missingSeparator"), None);
        assert_eq!(namespace_of(":name"), None);
    }
}
