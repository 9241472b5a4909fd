//! # Engine Errors
//!
//! Construction failures abort the engine as a whole. Everything after
//! construction either reaches the caller through a controller error or is
//! logged and contained.

use shared_bus::BusError;
use thiserror::Error;
use wallet_controllers::{ApprovalError, ControllerError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The host was used before `init` or after `destroy_engine`.
    #[error("Engine does not exist")]
    NotInitialized,

    /// A messenger allow-list did not validate against the bus.
    #[error("Message bus misconfigured: {0}")]
    Bus(#[from] BusError),

    /// A controller failed during construction or an operation.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Accepting or rejecting an approval failed.
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// The security alerts controller could not be built.
    #[error("Failed to initialize security controller: {0}")]
    SecurityController(ControllerError),

    /// Writing or reading the vault backup failed.
    #[error("Vault backup failed: {0}")]
    Backup(String),

    /// Fiat balance could not be computed.
    #[error("Balance computation failed: {0}")]
    Balance(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_message() {
        assert_eq!(EngineError::NotInitialized.to_string(), "Engine does not exist");
    }

    #[test]
    fn test_security_error_keeps_cause() {
        let err = EngineError::SecurityController(ControllerError::Config("no key".into()));
        assert!(err.to_string().contains("no key"));
    }
}
