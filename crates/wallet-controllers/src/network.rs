//! # Network Controller
//!
//! Owns the selected network and its provider. Dependents never hold the
//! provider itself; they receive a [`ProviderSource`] closure that always
//! yields the current one, so a network switch needs no re-wiring.

use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerEvent, ControllerMessenger, ControllerName, StateSlice};
use crate::ports::{ChainIdSource, Provider, ProviderFactory, ProviderSource};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::ChainId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Built-in network or custom RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkType {
    Mainnet,
    Goerli,
    Sepolia,
    LineaMainnet,
    Rpc,
}

impl NetworkType {
    /// Chain id of a built-in network.
    #[must_use]
    pub fn chain_id(&self) -> Option<ChainId> {
        match self {
            Self::Mainnet => Some(ChainId::MAINNET),
            Self::Goerli => Some(ChainId::GOERLI),
            Self::Sepolia => Some(ChainId::SEPOLIA),
            Self::LineaMainnet => Some(ChainId::LINEA_MAINNET),
            Self::Rpc => None,
        }
    }

    fn infura_subdomain(&self) -> Option<&'static str> {
        match self {
            Self::Mainnet => Some("mainnet"),
            Self::Goerli => Some("goerli"),
            Self::Sepolia => Some("sepolia"),
            Self::LineaMainnet => Some("linea-mainnet"),
            Self::Rpc => None,
        }
    }
}

/// The network a provider is built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub network_type: NetworkType,
    pub chain_id: ChainId,
    pub rpc_url: Option<String>,
    pub ticker: String,
    pub nickname: Option<String>,
}

impl ProviderConfig {
    #[must_use]
    pub fn builtin(network_type: NetworkType) -> Self {
        Self {
            network_type,
            chain_id: network_type.chain_id().unwrap_or(ChainId::MAINNET),
            rpc_url: None,
            ticker: "ETH".to_string(),
            nickname: None,
        }
    }

    #[must_use]
    pub fn custom(chain_id: ChainId, rpc_url: impl Into<String>, ticker: impl Into<String>) -> Self {
        Self {
            network_type: NetworkType::Rpc,
            chain_id,
            rpc_url: Some(rpc_url.into()),
            ticker: ticker.into(),
            nickname: None,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::builtin(NetworkType::Mainnet)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    #[default]
    Unknown,
    Available,
    Unavailable,
    Blocked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDetails {
    pub eip1559: Option<bool>,
}

/// A saved custom network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    pub rpc_url: String,
    pub chain_id: ChainId,
    pub ticker: String,
    pub nickname: Option<String>,
}

/// Network state slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub network_id: Option<String>,
    pub network_status: NetworkStatus,
    pub provider_config: ProviderConfig,
    pub network_details: NetworkDetails,
    pub network_configurations: BTreeMap<String, NetworkConfiguration>,
}

impl ControllerState for NetworkState {
    const NAME: ControllerName = ControllerName::Network;

    fn into_slice(self) -> StateSlice {
        StateSlice::Network(self)
    }
}

type ProviderCell = Arc<RwLock<Option<Arc<dyn Provider>>>>;

pub struct NetworkController {
    base: BaseController<NetworkState>,
    factory: Arc<dyn ProviderFactory>,
    provider: ProviderCell,
    infura_project_id: Option<String>,
}

impl NetworkController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        factory: Arc<dyn ProviderFactory>,
        initial: NetworkState,
        infura_project_id: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
            factory,
            provider: Arc::new(RwLock::new(None)),
            infura_project_id,
        })
    }

    #[must_use]
    pub fn state(&self) -> NetworkState {
        self.base.state()
    }

    #[must_use]
    pub fn provider_config(&self) -> ProviderConfig {
        self.base.read(|s| s.provider_config.clone())
    }

    #[must_use]
    pub fn current_chain_id(&self) -> ChainId {
        self.base.read(|s| s.provider_config.chain_id)
    }

    /// Closure yielding the current provider.
    #[must_use]
    pub fn provider_source(&self) -> ProviderSource {
        let cell = Arc::clone(&self.provider);
        Arc::new(move || cell.read().clone())
    }

    /// Closure yielding the current chain id.
    #[must_use]
    pub fn chain_id_source(self: &Arc<Self>) -> ChainIdSource {
        let weak = Arc::downgrade(self);
        Arc::new(move || {
            weak.upgrade()
                .map(|c| c.current_chain_id())
                .unwrap_or(ChainId::MAINNET)
        })
    }

    #[must_use]
    pub fn provider(&self) -> Option<Arc<dyn Provider>> {
        self.provider.read().clone()
    }

    /// Build the provider for the configured network and probe it.
    #[instrument(skip(self), fields(chain = %self.current_chain_id()))]
    pub async fn initialize_provider(&self) -> ControllerResult<()> {
        let config = self.resolved_config(self.provider_config())?;
        let provider = self.factory.create(&config)?;
        *self.provider.write() = Some(provider);
        self.lookup_network().await;
        info!("Provider initialized");
        Ok(())
    }

    /// Refresh network id, status and EIP-1559 support.
    pub async fn lookup_network(&self) {
        let Some(provider) = self.provider() else {
            return;
        };

        let network_id = provider.request("net_version", json!([])).await;
        let block = provider
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await;

        match (network_id, block) {
            (Ok(id), Ok(block)) => {
                let eip1559 = block.get("baseFeePerGas").is_some_and(|v| !v.is_null());
                self.base.update(|state| {
                    state.network_id = id.as_str().map(str::to_string);
                    state.network_status = NetworkStatus::Available;
                    state.network_details.eip1559 = Some(eip1559);
                });
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Network lookup failed");
                self.base.update(|state| {
                    state.network_id = None;
                    state.network_status = NetworkStatus::Unavailable;
                    state.network_details = NetworkDetails::default();
                });
            }
        }
    }

    /// Switch to a built-in network.
    pub async fn set_provider_type(&self, network_type: NetworkType) -> ControllerResult<()> {
        if network_type == NetworkType::Rpc {
            return Err(ControllerError::InvalidParams(
                "rpc networks are selected with set_active_network".into(),
            ));
        }
        self.switch_to(ProviderConfig::builtin(network_type)).await
    }

    /// Switch to a saved custom network.
    pub async fn set_active_network(&self, configuration_id: &str) -> ControllerResult<()> {
        let configuration = self
            .base
            .read(|s| s.network_configurations.get(configuration_id).cloned())
            .ok_or_else(|| ControllerError::NotFound(format!("network configuration {configuration_id}")))?;
        let mut config = ProviderConfig::custom(
            configuration.chain_id,
            configuration.rpc_url,
            configuration.ticker,
        );
        config.nickname = configuration.nickname;
        self.switch_to(config).await
    }

    /// Add or replace a custom network. Returns its id.
    pub fn upsert_network_configuration(&self, configuration: NetworkConfiguration) -> String {
        let existing = self.base.read(|s| {
            s.network_configurations
                .iter()
                .find(|(_, c)| c.rpc_url.eq_ignore_ascii_case(&configuration.rpc_url))
                .map(|(id, _)| id.clone())
        });
        let id = existing.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = id.clone();
        self.base.update(|state| {
            state.network_configurations.insert(key, configuration);
        });
        id
    }

    pub fn remove_network_configuration(&self, configuration_id: &str) {
        self.base.update(|state| {
            state.network_configurations.remove(configuration_id);
        });
    }

    async fn switch_to(&self, config: ProviderConfig) -> ControllerResult<()> {
        let resolved = self.resolved_config(config.clone())?;
        let provider = self.factory.create(&resolved)?;
        *self.provider.write() = Some(provider);
        self.base.update(|state| {
            state.provider_config = config.clone();
            state.network_status = NetworkStatus::Unknown;
        });
        self.lookup_network().await;

        info!(chain = %config.chain_id, "Network switched");
        if let Err(e) = self
            .base
            .messenger()
            .publish(ControllerEvent::NetworkDidChange(config))
        {
            warn!(error = %e, "networkDidChange not published");
        }
        Ok(())
    }

    /// Fill the RPC url of built-in networks.
    fn resolved_config(&self, mut config: ProviderConfig) -> ControllerResult<ProviderConfig> {
        if config.rpc_url.is_some() {
            return Ok(config);
        }
        let subdomain = config.network_type.infura_subdomain().ok_or_else(|| {
            ControllerError::Config("custom network without rpc url".into())
        })?;
        config.rpc_url = Some(match &self.infura_project_id {
            Some(id) => format!("https://{subdomain}.infura.io/v3/{id}"),
            None => format!("https://{subdomain}.infura.io/v3/"),
        });
        Ok(config)
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: NetworkState) {
        self.base.replace(next);
    }
}

/// Block number of a `eth_getBlockByNumber` result.
pub(crate) fn block_number(block: &Value) -> Option<u64> {
    block
        .get("number")
        .and_then(Value::as_str)
        .and_then(|n| u64::from_str_radix(n.trim_start_matches("0x"), 16).ok())
}
