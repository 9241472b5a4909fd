//! # WalletConnect Host
//!
//! Owns the protocol client and one [`SessionAdapter`] per active session.
//!
//! ## Startup
//!
//! ```text
//! init ─▶ flag set ─▶ warm-up delay ─▶ SignClientFactory::create
//!      ─▶ event loop + session sync
//!      ─▶ rehydrate active sessions (joined, per-session errors logged)
//!      ─▶ purge pending proposals and requests
//! ```
//!
//! ## Session lifecycle
//!
//! `proposed ─▶ approved ─▶ requests … ─▶ disconnected`, with `rejected`
//! reachable straight from `proposed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use shared_bus::SubscriptionId;
use shared_types::{Address, ApprovalType, ChainId, RpcError};
use wallet_controllers::messaging::events;
use wallet_controllers::{AddApprovalRequest, ControllerBus, ControllerEvent};
use wallet_engine::EngineContext;

use crate::adapters::BridgeServices;
use crate::config::BridgeConfig;
use crate::constants::{
    AUTO_REMOVED, ERROR_CODE, INVALID_ID, MANUAL_DISCONNECT, MANUAL_REJECT, REQUEST_SOURCE_WC2,
};
use crate::engine_access::EngineAccess;
use crate::errors::{BridgeError, BridgeResult};
use crate::wait::wait_for_condition;
use crate::walletconnect::client::{
    Session, SessionProposal, SessionRequest, SignClient, SignClientEvent,
};
use crate::walletconnect::session::{SessionAdapter, SessionOrigin};
use crate::walletconnect::uri::WalletConnectUri;

/// Holds at most one [`WalletConnectManager`].
pub struct WalletConnectHost {
    config: BridgeConfig,
    engine: Arc<dyn EngineAccess>,
    services: BridgeServices,
    initialized: AtomicBool,
    slot: RwLock<Option<Arc<WalletConnectManager>>>,
}

impl WalletConnectHost {
    #[must_use]
    pub fn new(config: BridgeConfig, engine: Arc<dyn EngineAccess>, services: BridgeServices) -> Self {
        Self {
            config,
            engine,
            services,
            initialized: AtomicBool::new(false),
            slot: RwLock::new(None),
        }
    }

    /// Build the manager. Later calls return immediately.
    ///
    /// The flag is cleared again when startup fails so a later call can retry.
    #[instrument(name = "walletconnect_init", skip_all)]
    pub async fn init(&self) -> BridgeResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("WalletConnect already initialized");
            return Ok(());
        }
        match self.start().await {
            Ok(manager) => {
                info!(sessions = manager.session_count(), "WalletConnect ready");
                Ok(())
            }
            Err(e) => {
                self.initialized.store(false, Ordering::SeqCst);
                error!(error = %e, "WalletConnect startup failed");
                Err(e)
            }
        }
    }

    async fn start(&self) -> BridgeResult<Arc<WalletConnectManager>> {
        tokio::time::sleep(self.config.warmup_delay).await;

        let context = self.engine.context()?;
        let bus = self.engine.controller_messenger()?;
        let client = self
            .services
            .sign_client_factory
            .create(self.config.project_id.as_deref(), &self.config.metadata)
            .await?;

        let manager = WalletConnectManager::new(client, context, self.services.clone(), &self.config);
        manager.start_event_loop();
        manager.start_session_sync(bus);
        manager.rehydrate().await;
        *self.slot.write() = Some(Arc::clone(&manager));
        manager.remove_pendings().await;
        Ok(manager)
    }

    pub fn get_instance(&self) -> BridgeResult<Arc<WalletConnectManager>> {
        self.slot.read().clone().ok_or(BridgeError::NotInitialized)
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Stop the manager's tasks and forget it.
    pub fn shutdown(&self) {
        if let Some(manager) = self.slot.write().take() {
            manager.shutdown();
        }
        self.initialized.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for WalletConnectHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnectHost")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// The live protocol client and its sessions.
pub struct WalletConnectManager {
    client: Arc<dyn SignClient>,
    context: EngineContext,
    services: BridgeServices,
    unlock_poll_interval: Duration,
    unlock_timeout: Duration,
    sessions: RwLock<HashMap<String, Arc<SessionAdapter>>>,
    /// Origin of each pairing started through `connect`, keyed by pairing topic.
    pairings: Mutex<HashMap<String, SessionOrigin>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<(Arc<ControllerBus>, SubscriptionId)>>,
}

impl WalletConnectManager {
    fn new(client: Arc<dyn SignClient>, context: EngineContext, services: BridgeServices, config: &BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            client,
            context,
            services,
            unlock_poll_interval: config.unlock_poll_interval,
            unlock_timeout: config.unlock_timeout,
            sessions: RwLock::new(HashMap::new()),
            pairings: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    fn adapter_for(&self, session: Session, origin: SessionOrigin) -> Arc<SessionAdapter> {
        Arc::new(SessionAdapter::new(
            Arc::clone(&self.client),
            self.context.clone(),
            Arc::clone(&self.services.analytics),
            Arc::clone(&self.services.redirect),
            session,
            origin,
        ))
    }

    fn insert_session(&self, adapter: Arc<SessionAdapter>) {
        let mut sessions = self.sessions.write();
        sessions.insert(adapter.topic(), adapter);
        wallet_telemetry::WALLETCONNECT_SESSIONS.set(sessions.len() as f64);
    }

    fn current_binding(&self) -> (ChainId, Vec<Address>) {
        let chain_id = self.context.network.current_chain_id();
        let accounts = self.context.preferences.selected_address().into_iter().collect();
        (chain_id, accounts)
    }

    fn start_event_loop(self: &Arc<Self>) {
        let mut events = self.client.subscribe();
        let manager = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "WalletConnect event listener lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                dispatch(manager, event);
            }
            debug!("WalletConnect event loop stopped");
        });
        self.tasks.lock().push(handle);
    }

    /// Keep sessions bound to the selected chain and account.
    fn start_session_sync(self: &Arc<Self>, bus: Arc<ControllerBus>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut subscriptions = self.subscriptions.lock();
        for event in [events::NETWORK_DID_CHANGE, events::PREFERENCES_STATE_CHANGE] {
            let tx = tx.clone();
            let id = bus.subscribe(
                event,
                Arc::new(move |_: &ControllerEvent| {
                    let _ = tx.send(());
                }),
            );
            subscriptions.push((Arc::clone(&bus), id));
        }

        let manager: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.sync_sessions().await;
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Restore adapters for every session the client still holds.
    async fn rehydrate(&self) {
        let restored: Vec<Arc<SessionAdapter>> = self
            .client
            .active_sessions()
            .into_iter()
            .map(|session| {
                let adapter = self.adapter_for(session, SessionOrigin::default());
                self.insert_session(Arc::clone(&adapter));
                adapter
            })
            .collect();
        info!(sessions = restored.len(), "Rehydrating WalletConnect sessions");
        let (chain_id, accounts) = self.current_binding();
        update_jointly(restored, chain_id, accounts).await;
    }

    /// Push the current chain and account to every session that is out of date.
    pub async fn sync_sessions(&self) {
        let (chain_id, accounts) = self.current_binding();
        let stale: Vec<Arc<SessionAdapter>> = self
            .sessions
            .read()
            .values()
            .filter(|adapter| {
                let session = adapter.session();
                session.chain_id != chain_id || session.accounts != accounts
            })
            .cloned()
            .collect();
        if !stale.is_empty() {
            update_jointly(stale, chain_id, accounts).await;
        }
    }

    /// Reject whatever a previous run left pending.
    pub async fn remove_pendings(&self) {
        for proposal in self.client.pending_session_proposals() {
            if let Err(e) = self
                .client
                .reject_session(proposal.id, RpcError::new(ERROR_CODE, AUTO_REMOVED))
                .await
            {
                warn!(id = proposal.id, error = %e, "Can't remove pending session");
            }
        }
        for request in self.client.pending_session_requests() {
            if let Err(e) = self
                .client
                .reject_request(&request.topic, request.id, RpcError::new(ERROR_CODE, MANUAL_REJECT))
                .await
            {
                warn!(id = request.id, error = %e, "Can't remove request");
            }
        }
    }

    #[instrument(skip(self, proposal), fields(id = proposal.id))]
    pub async fn on_session_proposal(&self, proposal: SessionProposal) {
        let peer = &proposal.proposer;
        let name = if peer.name.is_empty() {
            peer.description.clone()
        } else {
            peer.name.clone()
        };
        let request = AddApprovalRequest::new(
            peer.url.clone(),
            ApprovalType::WalletConnect,
            json!({
                "hostname": peer.url,
                "peerMeta": {
                    "url": peer.url,
                    "name": name,
                    "icons": peer.icons,
                    "analytics": {
                        "request_source": REQUEST_SOURCE_WC2,
                        "request_platform": "",
                    },
                },
            }),
        )
        .with_id(proposal.id.to_string());
        // Claimed up front so a rejected or failed proposal does not leave the pairing behind.
        let origin = self
            .pairings
            .lock()
            .remove(&proposal.pairing_topic)
            .unwrap_or_default();

        if let Err(e) = self.context.approval.add_and_wait(request).await {
            info!(reason = %e, "Session proposal rejected");
            if let Err(e) = self
                .client
                .reject_session(proposal.id, RpcError::user_rejected_methods())
                .await
            {
                warn!(error = %e, "Error while rejecting session");
            }
            return;
        }

        let (chain_id, accounts) = self.current_binding();
        match self.client.approve_session(proposal.id, chain_id, accounts).await {
            Ok(session) => {
                info!(topic = %session.topic, peer = %session.peer.url, "Session approved");
                self.insert_session(self.adapter_for(session, origin));
            }
            Err(e) => error!(error = %e, "Invalid wallet status while approving session"),
        }
    }

    #[instrument(skip(self, request), fields(id = request.id, topic = %request.topic))]
    pub async fn on_session_request(&self, request: SessionRequest) {
        let keyring = Arc::clone(&self.context.keyring);
        let unlocked = wait_for_condition(
            move || keyring.is_unlocked(),
            self.unlock_poll_interval,
            self.unlock_timeout,
            "keyring unlock",
        )
        .await;
        if let Err(e) = unlocked {
            warn!(error = %e, "Wallet stayed locked");
            self.reject_unrouted(&request, RpcError::unauthorized("Wallet is locked")).await;
            return;
        }

        let adapter = self.sessions.read().get(&request.topic).cloned();
        let Some(adapter) = adapter else {
            warn!("Request for unknown session topic");
            self.reject_unrouted(&request, RpcError::new(ERROR_CODE, INVALID_ID)).await;
            return;
        };
        adapter.handle_request(request).await;
    }

    async fn reject_unrouted(&self, request: &SessionRequest, error: RpcError) {
        if let Err(e) = self.client.reject_request(&request.topic, request.id, error).await {
            warn!(error = %e, "Error while rejecting request");
        }
        wallet_telemetry::metric_inc!(wallet_telemetry::WALLETCONNECT_REQUESTS, &["rejected"]);
    }

    /// The peer ended the session.
    pub fn on_session_delete(&self, topic: &str) {
        let mut sessions = self.sessions.write();
        if sessions.remove(topic).is_some() {
            info!(topic, "Session deleted by peer");
        }
        wallet_telemetry::WALLETCONNECT_SESSIONS.set(sessions.len() as f64);
    }

    /// Open a connection from a `wc:` uri. Failures are logged, never returned.
    #[instrument(skip(self, uri, redirect_url))]
    pub async fn connect(&self, uri: &str, redirect_url: Option<&str>, origin: &str) {
        let parsed = match WalletConnectUri::parse(uri) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %e, "Failed to connect");
                return;
            }
        };
        let result = match parsed.version {
            1 => self.services.legacy.new_session(uri, redirect_url, origin).await,
            2 => {
                self.pairings.lock().insert(
                    parsed.topic.clone(),
                    SessionOrigin {
                        origin: Some(origin.to_string()),
                        redirect_url: redirect_url.map(str::to_string),
                    },
                );
                self.client.pair(uri).await
            }
            version => {
                warn!(version, "Invalid wallet connect uri");
                return;
            }
        };
        if let Err(e) = result {
            self.pairings.lock().remove(&parsed.topic);
            error!(error = %e, version = parsed.version, "Failed to connect");
        }
    }

    /// Pairings opened through `connect` that no proposal has claimed yet.
    #[must_use]
    pub fn pending_pairing_count(&self) -> usize {
        self.pairings.lock().len()
    }

    /// Sessions as the protocol client knows them.
    #[must_use]
    pub fn get_sessions(&self) -> Vec<Session> {
        self.client.active_sessions()
    }

    #[must_use]
    pub fn session(&self, topic: &str) -> Option<Arc<SessionAdapter>> {
        self.sessions.read().get(topic).cloned()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Disconnect a session from the wallet side.
    pub async fn remove_session(&self, topic: &str) -> BridgeResult<()> {
        self.client
            .disconnect_session(topic, RpcError::new(ERROR_CODE, MANUAL_DISCONNECT))
            .await?;
        self.on_session_delete(topic);
        Ok(())
    }

    fn shutdown(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        for (bus, id) in self.subscriptions.lock().drain(..) {
            bus.unsubscribe(id);
        }
        self.sessions.write().clear();
        wallet_telemetry::WALLETCONNECT_SESSIONS.set(0.0);
        info!("WalletConnect stopped");
    }
}

impl std::fmt::Debug for WalletConnectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnectManager")
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

/// Proposals and requests each get their own task so a pending approval does
/// not hold up other sessions.
fn dispatch(manager: Arc<WalletConnectManager>, event: SignClientEvent) {
    match event {
        SignClientEvent::SessionProposal(proposal) => {
            tokio::spawn(async move { manager.on_session_proposal(proposal).await });
        }
        SignClientEvent::SessionRequest(request) => {
            tokio::spawn(async move { manager.on_session_request(request).await });
        }
        SignClientEvent::SessionDelete { topic } => manager.on_session_delete(&topic),
    }
}

async fn update_jointly(adapters: Vec<Arc<SessionAdapter>>, chain_id: ChainId, accounts: Vec<Address>) {
    let mut set = JoinSet::new();
    for adapter in adapters {
        let accounts = accounts.clone();
        set.spawn(async move {
            let topic = adapter.topic();
            (topic, adapter.update_session(chain_id, accounts).await)
        });
    }
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((topic, Err(e))) => warn!(topic = %topic, error = %e, "Can't update session"),
            Err(e) => warn!(error = %e, "Session update task failed"),
        }
    }
}
