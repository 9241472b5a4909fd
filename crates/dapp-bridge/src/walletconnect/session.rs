//! # Session Adapter
//!
//! One per active session. Routes a peer's requests into the engine and the
//! outcomes back to the peer on the topic the request arrived on.
//!
//! ```text
//! SessionRequest ──▶ record id → topic
//!                ──▶ chain check (mismatch: reject, stop)
//!                ──▶ eth_sendTransaction: transaction controller
//!                    anything else: RpcMiddleware
//!                ──▶ approve_request / reject_request ──▶ release id, redirect
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use shared_types::{Address, ChainId, RpcError};
use wallet_controllers::ports::AnalyticsSink;
use wallet_engine::EngineContext;

use crate::constants::{ERROR_CODE, INVALID_CHAIN, ORIGIN_DEEPLINK, ORIGIN_QR_CODE};
use crate::errors::ProtocolError;
use crate::rpc::{transaction_param, RpcMiddleware};
use crate::walletconnect::client::{DappRedirect, Session, SessionRequest, SignClient};

/// How the session was opened, as far as the wallet knows.
#[derive(Debug, Clone, Default)]
pub struct SessionOrigin {
    /// `deeplink`, `qr-code`, or `None` for sessions restored on startup.
    pub origin: Option<String>,
    pub redirect_url: Option<String>,
}

pub struct SessionAdapter {
    client: Arc<dyn SignClient>,
    context: EngineContext,
    analytics: Arc<dyn AnalyticsSink>,
    redirect: Arc<dyn DappRedirect>,
    session: RwLock<Session>,
    origin: SessionOrigin,
    topic_by_request_id: Mutex<HashMap<u64, String>>,
    requests_to_redirect: Mutex<HashSet<u64>>,
}

impl SessionAdapter {
    #[must_use]
    pub fn new(
        client: Arc<dyn SignClient>,
        context: EngineContext,
        analytics: Arc<dyn AnalyticsSink>,
        redirect: Arc<dyn DappRedirect>,
        session: Session,
        origin: SessionOrigin,
    ) -> Self {
        Self {
            client,
            context,
            analytics,
            redirect,
            session: RwLock::new(session),
            origin,
            topic_by_request_id: Mutex::new(HashMap::new()),
            requests_to_redirect: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn topic(&self) -> String {
        self.session.read().topic.clone()
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    /// Whether a response to `id` is still owed.
    #[must_use]
    pub fn is_pending(&self, id: u64) -> bool {
        self.topic_by_request_id.lock().contains_key(&id)
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.topic_by_request_id.lock().len()
    }

    #[instrument(name = "wc_request", skip(self, request), fields(id = request.id, method = %request.method))]
    pub async fn handle_request(&self, request: SessionRequest) {
        self.topic_by_request_id
            .lock()
            .insert(request.id, request.topic.clone());
        if self.origin.origin.as_deref() == Some(ORIGIN_DEEPLINK) {
            self.requests_to_redirect.lock().insert(request.id);
        }

        let selected = self.context.network.current_chain_id();
        let requested = ChainId::parse(&request.chain_id).ok();
        if requested != Some(selected) {
            warn!(requested = %request.chain_id, %selected, "Request targets another chain");
            self.reject_request(request.id, RpcError::new(ERROR_CODE, INVALID_CHAIN))
                .await;
            return;
        }

        let origin = if request.verified_origin.is_empty() {
            self.session.read().peer.url.clone()
        } else {
            request.verified_origin.clone()
        };

        if request.method == "eth_sendTransaction" {
            let submitted = match transaction_param(&request.params) {
                Ok(tx) => self
                    .context
                    .transaction
                    .add_transaction(tx, &origin)
                    .await
                    .map_err(|e| e.to_rpc_error()),
                Err(e) => Err(e),
            };
            match submitted {
                Ok(hash) => self.approve_request(request.id, json!(hash)).await,
                Err(error) => self.reject_request(request.id, error).await,
            }
            return;
        }

        // The generic path reads plain eth_signTypedData with the wrong parameter order.
        let method = if request.method == "eth_signTypedData" {
            "eth_signTypedData_v3"
        } else {
            request.method.as_str()
        };
        let middleware = RpcMiddleware::new(self.context.clone(), Arc::clone(&self.analytics), origin);
        match middleware.handle(method, request.params.clone()).await {
            Ok(result) => self.approve_request(request.id, result).await,
            Err(error) => self.reject_request(request.id, error).await,
        }
    }

    /// Answer `id` with a result. Transport errors are logged.
    pub async fn approve_request(&self, id: u64, result: Value) {
        let Some(topic) = self.topic_by_request_id.lock().remove(&id) else {
            warn!(id, "No topic recorded for request");
            return;
        };
        if let Err(e) = self.client.approve_request(&topic, id, result).await {
            warn!(id, topic = %topic, error = %e, "Error while approving request");
        }
        wallet_telemetry::metric_inc!(wallet_telemetry::WALLETCONNECT_REQUESTS, &["approved"]);
        self.needs_redirect(id);
    }

    /// Answer `id` with an error. Transport errors are logged.
    pub async fn reject_request(&self, id: u64, error: RpcError) {
        let Some(topic) = self.topic_by_request_id.lock().remove(&id) else {
            warn!(id, "No topic recorded for request");
            return;
        };
        if let Err(e) = self.client.reject_request(&topic, id, error).await {
            warn!(id, topic = %topic, error = %e, "Error while rejecting request");
        }
        wallet_telemetry::metric_inc!(wallet_telemetry::WALLETCONNECT_REQUESTS, &["rejected"]);
        self.needs_redirect(id);
    }

    /// Push the wallet's chain and accounts to the peer.
    pub async fn update_session(&self, chain_id: ChainId, accounts: Vec<Address>) -> Result<(), ProtocolError> {
        let topic = self.topic();
        self.client
            .update_session(&topic, chain_id, accounts.clone())
            .await?;
        let mut session = self.session.write();
        session.chain_id = chain_id;
        session.accounts = accounts;
        debug!(topic = %topic, %chain_id, "Session updated");
        Ok(())
    }

    fn needs_redirect(&self, id: u64) {
        if self.requests_to_redirect.lock().remove(&id) {
            self.redirect_to_dapp();
        }
    }

    fn redirect_to_dapp(&self) {
        if self.origin.origin.as_deref() == Some(ORIGIN_QR_CODE) {
            return;
        }
        let topic = self.topic();
        info!(topic = %topic, "Returning to dapp");
        self.redirect.redirect(&topic, self.origin.redirect_url.as_deref());
    }
}

impl std::fmt::Debug for SessionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAdapter")
            .field("topic", &self.topic())
            .field("origin", &self.origin)
            .field("pending", &self.pending_requests())
            .finish()
    }
}
