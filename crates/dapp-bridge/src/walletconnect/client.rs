//! Protocol client boundary.
//!
//! The relay, pairing crypto and session persistence live behind
//! [`SignClient`]; the host only sees typed events and calls.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use shared_types::{Address, ChainId, RpcError};

use crate::errors::ProtocolError;

/// Name, url and icons a peer presents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposal {
    pub id: u64,
    /// Pairing the proposal arrived on.
    pub pairing_topic: String,
    pub proposer: PeerMetadata,
}

/// An approved session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub topic: String,
    #[serde(default)]
    pub pairing_topic: String,
    pub peer: PeerMetadata,
    pub chain_id: ChainId,
    pub accounts: Vec<Address>,
}

/// A JSON-RPC request a peer sent over a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub id: u64,
    pub topic: String,
    /// CAIP-2 chain the peer targets, e.g. `eip155:1`.
    pub chain_id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Origin attested by the verify service.
    #[serde(default)]
    pub verified_origin: String,
}

#[derive(Debug, Clone)]
pub enum SignClientEvent {
    SessionProposal(SessionProposal),
    SessionRequest(SessionRequest),
    SessionDelete { topic: String },
}

#[async_trait]
pub trait SignClient: Send + Sync {
    /// Inbound protocol events.
    fn subscribe(&self) -> broadcast::Receiver<SignClientEvent>;

    async fn approve_session(&self, id: u64, chain_id: ChainId, accounts: Vec<Address>) -> Result<Session, ProtocolError>;

    async fn reject_session(&self, id: u64, error: RpcError) -> Result<(), ProtocolError>;

    async fn approve_request(&self, topic: &str, id: u64, result: Value) -> Result<(), ProtocolError>;

    async fn reject_request(&self, topic: &str, id: u64, error: RpcError) -> Result<(), ProtocolError>;

    /// Push the wallet's current chain and accounts into a session.
    async fn update_session(&self, topic: &str, chain_id: ChainId, accounts: Vec<Address>) -> Result<(), ProtocolError>;

    async fn disconnect_session(&self, topic: &str, error: RpcError) -> Result<(), ProtocolError>;

    /// Pair with a v2 `wc:` uri.
    async fn pair(&self, uri: &str) -> Result<(), ProtocolError>;

    fn active_sessions(&self) -> Vec<Session>;

    fn pending_session_proposals(&self) -> Vec<SessionProposal>;

    fn pending_session_requests(&self) -> Vec<SessionRequest>;
}

/// Builds the protocol client once the engine is up.
#[async_trait]
pub trait SignClientFactory: Send + Sync {
    async fn create(&self, project_id: Option<&str>, metadata: &PeerMetadata) -> Result<Arc<dyn SignClient>, ProtocolError>;
}

/// Handler for v1 `wc:` uris, which the v2 client cannot pair.
#[async_trait]
pub trait LegacyConnector: Send + Sync {
    async fn new_session(&self, uri: &str, redirect_url: Option<&str>, origin: &str) -> Result<(), ProtocolError>;
}

/// Returns focus to the dapp after a response was sent.
pub trait DappRedirect: Send + Sync {
    fn redirect(&self, topic: &str, redirect_url: Option<&str>);
}
