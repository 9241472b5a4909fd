//! # Bridge Errors
//!
//! Errors that stay inside the bridge. Peer-facing failures are turned into
//! JSON-RPC error responses; only misuse of the host (`get_instance` before
//! `init`) and engine absence reach callers directly.

use thiserror::Error;
use wallet_engine::EngineError;

/// Failures reported by the protocol client or the SDK transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("No session with topic {0}")]
    UnknownTopic(String),

    #[error("No pending proposal with id {0}")]
    UnknownProposal(u64),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("WalletConnectV2 manager not initialized")]
    NotInitialized,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Invalid WalletConnect uri: {0}")]
    InvalidUri(String),

    /// A bounded wait ran out.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
