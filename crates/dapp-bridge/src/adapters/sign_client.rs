//! In-process protocol client.
//!
//! Keeps sessions and pending work in memory and records every outbound
//! call, so the host can run without a relay.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use shared_types::{Address, ChainId, RpcError};

use crate::errors::ProtocolError;
use crate::walletconnect::{
    PeerMetadata, Session, SessionProposal, SessionRequest, SignClient, SignClientEvent, SignClientFactory,
};

const EVENT_CAPACITY: usize = 64;

/// An outbound call as the peer would see it.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    ApproveSession { id: u64, chain_id: ChainId, accounts: Vec<Address> },
    RejectSession { id: u64, error: RpcError },
    ApproveRequest { topic: String, id: u64, result: Value },
    RejectRequest { topic: String, id: u64, error: RpcError },
    UpdateSession { topic: String, chain_id: ChainId, accounts: Vec<Address> },
    DisconnectSession { topic: String, error: RpcError },
    Pair { uri: String },
}

pub struct InMemorySignClient {
    events: broadcast::Sender<SignClientEvent>,
    sessions: RwLock<BTreeMap<String, Session>>,
    proposals: RwLock<BTreeMap<u64, SessionProposal>>,
    requests: RwLock<Vec<SessionRequest>>,
    calls: Mutex<Vec<ClientCall>>,
    offline: AtomicBool,
}

impl Default for InMemorySignClient {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            sessions: RwLock::new(BTreeMap::new()),
            proposals: RwLock::new(BTreeMap::new()),
            requests: RwLock::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }
}

impl InMemorySignClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session persisted by an earlier run.
    pub fn add_session(&self, session: Session) {
        self.sessions.write().insert(session.topic.clone(), session);
    }

    pub fn add_pending_proposal(&self, proposal: SessionProposal) {
        self.proposals.write().insert(proposal.id, proposal);
    }

    pub fn add_pending_request(&self, request: SessionRequest) {
        self.requests.write().push(request);
    }

    /// Deliver an event as if it came from the relay.
    pub fn emit(&self, event: SignClientEvent) {
        match &event {
            SignClientEvent::SessionProposal(proposal) => self.add_pending_proposal(proposal.clone()),
            SignClientEvent::SessionRequest(request) => self.add_pending_request(request.clone()),
            SignClientEvent::SessionDelete { topic } => {
                self.sessions.write().remove(topic);
            }
        }
        if self.events.send(event).is_err() {
            debug!("No WalletConnect listeners");
        }
    }

    /// Make every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: ClientCall) -> Result<(), ProtocolError> {
        self.calls.lock().push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProtocolError::Transport("relay unreachable".into()));
        }
        Ok(())
    }

    fn settle_request(&self, topic: &str, id: u64) {
        self.requests
            .write()
            .retain(|request| !(request.id == id && request.topic == topic));
    }
}

#[async_trait]
impl SignClient for InMemorySignClient {
    fn subscribe(&self) -> broadcast::Receiver<SignClientEvent> {
        self.events.subscribe()
    }

    async fn approve_session(&self, id: u64, chain_id: ChainId, accounts: Vec<Address>) -> Result<Session, ProtocolError> {
        self.record(ClientCall::ApproveSession {
            id,
            chain_id,
            accounts: accounts.clone(),
        })?;
        let proposal = self
            .proposals
            .write()
            .remove(&id)
            .ok_or(ProtocolError::UnknownProposal(id))?;
        let session = Session {
            topic: Uuid::new_v4().simple().to_string(),
            pairing_topic: proposal.pairing_topic,
            peer: proposal.proposer,
            chain_id,
            accounts,
        };
        self.add_session(session.clone());
        Ok(session)
    }

    async fn reject_session(&self, id: u64, error: RpcError) -> Result<(), ProtocolError> {
        self.record(ClientCall::RejectSession { id, error })?;
        self.proposals.write().remove(&id);
        Ok(())
    }

    async fn approve_request(&self, topic: &str, id: u64, result: Value) -> Result<(), ProtocolError> {
        self.record(ClientCall::ApproveRequest {
            topic: topic.to_string(),
            id,
            result,
        })?;
        self.settle_request(topic, id);
        Ok(())
    }

    async fn reject_request(&self, topic: &str, id: u64, error: RpcError) -> Result<(), ProtocolError> {
        self.record(ClientCall::RejectRequest {
            topic: topic.to_string(),
            id,
            error,
        })?;
        self.settle_request(topic, id);
        Ok(())
    }

    async fn update_session(&self, topic: &str, chain_id: ChainId, accounts: Vec<Address>) -> Result<(), ProtocolError> {
        self.record(ClientCall::UpdateSession {
            topic: topic.to_string(),
            chain_id,
            accounts: accounts.clone(),
        })?;
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(topic)
            .ok_or_else(|| ProtocolError::UnknownTopic(topic.to_string()))?;
        session.chain_id = chain_id;
        session.accounts = accounts;
        Ok(())
    }

    async fn disconnect_session(&self, topic: &str, error: RpcError) -> Result<(), ProtocolError> {
        self.record(ClientCall::DisconnectSession {
            topic: topic.to_string(),
            error,
        })?;
        self.sessions
            .write()
            .remove(topic)
            .map(|_| ())
            .ok_or_else(|| ProtocolError::UnknownTopic(topic.to_string()))
    }

    async fn pair(&self, uri: &str) -> Result<(), ProtocolError> {
        self.record(ClientCall::Pair { uri: uri.to_string() })
    }

    fn active_sessions(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    fn pending_session_proposals(&self) -> Vec<SessionProposal> {
        self.proposals.read().values().cloned().collect()
    }

    fn pending_session_requests(&self) -> Vec<SessionRequest> {
        self.requests.read().clone()
    }
}

/// Hands out one shared [`InMemorySignClient`].
#[derive(Default, Clone)]
pub struct InMemorySignClientFactory {
    client: Arc<InMemorySignClient>,
}

impl InMemorySignClientFactory {
    #[must_use]
    pub fn new(client: Arc<InMemorySignClient>) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> Arc<InMemorySignClient> {
        Arc::clone(&self.client)
    }
}

#[async_trait]
impl SignClientFactory for InMemorySignClientFactory {
    async fn create(&self, project_id: Option<&str>, metadata: &PeerMetadata) -> Result<Arc<dyn SignClient>, ProtocolError> {
        debug!(project_id, wallet = %metadata.name, "Using in-memory WalletConnect client");
        let client: Arc<dyn SignClient> = self.client.clone();
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proposal(id: u64) -> SessionProposal {
        SessionProposal {
            id,
            pairing_topic: "pairing".into(),
            proposer: PeerMetadata {
                name: "Dapp".into(),
                url: "https://dapp.test".into(),
                ..PeerMetadata::default()
            },
        }
    }

    #[tokio::test]
    async fn test_approve_session_consumes_proposal() {
        let client = InMemorySignClient::new();
        client.add_pending_proposal(proposal(7));

        let session = client
            .approve_session(7, ChainId::MAINNET, Vec::new())
            .await
            .unwrap();

        assert_eq!(session.peer.url, "https://dapp.test");
        assert!(client.pending_session_proposals().is_empty());
        assert_eq!(client.active_sessions(), vec![session]);
    }

    #[tokio::test]
    async fn test_offline_calls_fail_but_are_recorded() {
        let client = InMemorySignClient::new();
        client.set_offline(true);

        let result = client.approve_request("topic", 1, json!("0x1")).await;

        assert!(matches!(result, Err(ProtocolError::Transport(_))));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_emitted_request_is_pending_until_answered() {
        let client = InMemorySignClient::new();
        let mut events = client.subscribe();
        client.emit(SignClientEvent::SessionRequest(SessionRequest {
            id: 3,
            topic: "t".into(),
            chain_id: "eip155:1".into(),
            method: "eth_chainId".into(),
            params: json!([]),
            verified_origin: String::new(),
        }));

        assert!(matches!(events.recv().await, Ok(SignClientEvent::SessionRequest(_))));
        assert_eq!(client.pending_session_requests().len(), 1);
        client.reject_request("t", 3, RpcError::user_rejected_request()).await.unwrap();
        assert!(client.pending_session_requests().is_empty());
    }
}
