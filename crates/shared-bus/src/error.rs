//! # Bus Errors

use thiserror::Error;

/// Errors raised by the message bus and restricted messengers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// Identifier is not of the form `Namespace:name`.
    #[error("Malformed bus identifier: {0}")]
    MalformedName(String),

    /// Allow-list names an action no controller has registered.
    #[error("Unknown action in allow-list: {0}")]
    UnknownAction(String),

    /// Allow-list names an event the bus cannot carry.
    #[error("Unknown event in allow-list: {0}")]
    UnknownEvent(String),

    /// A messenger called an action outside its allow-list.
    #[error("{messenger} is not allowed to call {action}")]
    ActionNotAllowed { messenger: String, action: String },

    /// A messenger subscribed to an event outside its allow-list.
    #[error("{messenger} is not allowed to subscribe to {event}")]
    EventNotAllowed { messenger: String, event: String },

    /// A messenger tried to publish or register under another namespace.
    #[error("{messenger} cannot act on behalf of {name}")]
    ForeignNamespace { messenger: String, name: String },

    /// No handler is registered for the action.
    #[error("No handler registered for {0}")]
    NoHandler(String),

    /// A handler is already registered for the action.
    #[error("Handler already registered for {0}")]
    HandlerAlreadyRegistered(String),
}
