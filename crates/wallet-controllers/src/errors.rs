//! # Controller Errors

use shared_bus::BusError;
use shared_types::{Address, ApprovalType, ChainId, RpcError};
use thiserror::Error;

/// Errors from the approval controller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApprovalError {
    /// No pending approval has this id (unknown or already resolved).
    #[error("Approval request with id '{0}' not found.")]
    NotFound(String),

    /// An approval with the same id is already pending.
    #[error("Approval request with id '{0}' already exists.")]
    DuplicateId(String),

    /// The origin already has a pending approval of this type.
    #[error("Request of type '{approval_type}' already pending for origin {origin}. Please wait.")]
    AlreadyPending {
        origin: String,
        approval_type: ApprovalType,
    },

    /// The user (or the system on their behalf) rejected the approval.
    #[error("Approval rejected: {0}")]
    Rejected(RpcError),

    /// The requester reported a failure after the approval was accepted.
    #[error("Approval result failed: {0}")]
    ResultFailed(RpcError),

    /// The other side of the approval went away before resolving it.
    #[error("Approval was abandoned before it resolved")]
    Abandoned,
}

impl ApprovalError {
    /// JSON-RPC error reported to the requesting dapp.
    #[must_use]
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Rejected(e) | Self::ResultFailed(e) => e.clone(),
            Self::AlreadyPending { .. } => RpcError::new(shared_types::rpc::LIMIT_EXCEEDED, self.to_string()),
            other => RpcError::internal(other.to_string()),
        }
    }
}

/// Errors from the keyring controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyringError {
    #[error("Keyring is locked")]
    Locked,

    #[error("No vault exists")]
    NoVault,

    #[error("Incorrect password")]
    IncorrectPassword,

    #[error("No key found for account {0}")]
    UnknownAccount(Address),

    #[error("Account {0} already exists")]
    DuplicateAccount(Address),

    #[error("Invalid signing request: {0}")]
    InvalidRequest(String),

    #[error("Crypto failure: {0}")]
    Crypto(String),
}

/// Errors shared by all controllers.
#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Keyring(#[from] KeyringError),

    /// A JSON-RPC error returned by the chain or a dapp-facing check.
    #[error("{0}")]
    Rpc(#[from] RpcError),

    #[error("No provider is available")]
    NoProvider,

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream source failed: {0}")]
    Source(String),

    #[error("Unexpected bus response for {0}")]
    UnexpectedResponse(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feature disabled: {0}")]
    Disabled(String),

    /// The active network moved away from the chain a request was made for.
    #[error("Network changed from {expected} to {actual}")]
    ChainChanged { expected: ChainId, actual: ChainId },
}

impl ControllerError {
    /// JSON-RPC error reported to the requesting dapp.
    #[must_use]
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::Rpc(e) => e.clone(),
            Self::Approval(e) => e.to_rpc_error(),
            Self::InvalidParams(msg) => RpcError::invalid_params(msg.clone()),
            Self::Keyring(KeyringError::Locked) => RpcError::unauthorized("Wallet is locked"),
            Self::Keyring(KeyringError::UnknownAccount(a)) => {
                RpcError::unauthorized(format!("Account {a} is not available"))
            }
            Self::Disabled(msg) => RpcError::new(shared_types::rpc::UNSUPPORTED_METHOD, msg.clone()),
            Self::ChainChanged { .. } => RpcError::invalid_params(self.to_string()),
            other => RpcError::internal(other.to_string()),
        }
    }
}

impl From<shared_types::ParseError> for ControllerError {
    fn from(e: shared_types::ParseError) -> Self {
        Self::InvalidParams(e.to_string())
    }
}

/// Result alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_maps_to_original_rpc_error() {
        let err = ControllerError::from(ApprovalError::Rejected(RpcError::user_rejected_request()));
        assert_eq!(err.to_rpc_error().code, shared_types::rpc::USER_REJECTED_REQUEST);
    }

    #[test]
    fn test_locked_keyring_is_unauthorized() {
        let err = ControllerError::from(KeyringError::Locked);
        assert_eq!(err.to_rpc_error().code, shared_types::rpc::UNAUTHORIZED);
    }
}
