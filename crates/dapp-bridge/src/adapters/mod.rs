//! Local implementations of the bridge's outbound ports.

mod sdk;
mod sign_client;

pub use sdk::{InMemorySdkConnect, SdkCall};
pub use sign_client::{ClientCall, InMemorySignClient, InMemorySignClientFactory};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use wallet_controllers::adapters::TracingAnalytics;
use wallet_controllers::ports::AnalyticsSink;

use crate::errors::ProtocolError;
use crate::walletconnect::{DappRedirect, LegacyConnector, SignClientFactory};

/// Every outbound dependency of the WalletConnect host.
#[derive(Clone)]
pub struct BridgeServices {
    pub sign_client_factory: Arc<dyn SignClientFactory>,
    pub legacy: Arc<dyn LegacyConnector>,
    pub redirect: Arc<dyn DappRedirect>,
    pub analytics: Arc<dyn AnalyticsSink>,
}

impl BridgeServices {
    /// In-memory client, logging sinks, no v1 support.
    #[must_use]
    pub fn local() -> Self {
        Self {
            sign_client_factory: Arc::new(InMemorySignClientFactory::default()),
            legacy: Arc::new(UnsupportedLegacyConnector),
            redirect: Arc::new(LogRedirect),
            analytics: Arc::new(TracingAnalytics),
        }
    }
}

impl std::fmt::Debug for BridgeServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServices").finish_non_exhaustive()
    }
}

/// Refuses v1 uris.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedLegacyConnector;

#[async_trait]
impl LegacyConnector for UnsupportedLegacyConnector {
    async fn new_session(&self, _uri: &str, _redirect_url: Option<&str>, origin: &str) -> Result<(), ProtocolError> {
        warn!(origin, "WalletConnect v1 is not supported");
        Err(ProtocolError::Unsupported("WalletConnect v1".into()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogRedirect;

impl DappRedirect for LogRedirect {
    fn redirect(&self, topic: &str, redirect_url: Option<&str>) {
        debug!(topic, redirect_url, "Redirect to dapp");
    }
}

/// Records the topics it was asked to return to.
#[derive(Debug, Default)]
pub struct RecordingRedirect {
    topics: Mutex<Vec<String>>,
}

impl RecordingRedirect {
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().clone()
    }
}

impl DappRedirect for RecordingRedirect {
    fn redirect(&self, topic: &str, _redirect_url: Option<&str>) {
        self.topics.lock().push(topic.to_string());
    }
}
