//! # Token List Controller
//!
//! Known tokens per chain, cached with a time-to-live.

use crate::base::{BaseController, ControllerState};
use crate::errors::ControllerResult;
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use crate::ports::{ChainIdSource, TokenListSource};
use serde::{Deserialize, Serialize};
use shared_types::{now_millis, Address, ChainId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default cache lifetime of a chain's list.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListEntry {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub aggregators: Vec<String>,
    #[serde(default)]
    pub occurrences: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenListCache {
    pub timestamp: u64,
    pub data: BTreeMap<Address, TokenListEntry>,
}

/// Token list state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListState {
    pub token_list: BTreeMap<Address, TokenListEntry>,
    pub tokens_chains_cache: BTreeMap<ChainId, TokenListCache>,
}

impl ControllerState for TokenListState {
    const NAME: ControllerName = ControllerName::TokenList;

    fn into_slice(self) -> StateSlice {
        StateSlice::TokenList(self)
    }
}

pub struct TokenListController {
    base: BaseController<TokenListState>,
    source: Arc<dyn TokenListSource>,
    chain_id: ChainIdSource,
    cache_ttl: Duration,
}

impl TokenListController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        source: Arc<dyn TokenListSource>,
        chain_id: ChainIdSource,
        initial: TokenListState,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
            source,
            chain_id,
            cache_ttl: DEFAULT_CACHE_TTL,
        })
    }

    #[must_use]
    pub fn state(&self) -> TokenListState {
        self.base.state()
    }

    /// Entries of the current chain's list.
    #[must_use]
    pub fn entries(&self) -> Vec<TokenListEntry> {
        self.base.read(|s| s.token_list.values().cloned().collect())
    }

    /// Load the current chain's list from cache or the source.
    pub async fn fetch_token_list(&self) -> ControllerResult<()> {
        let chain = (self.chain_id)();
        let ttl_ms = self.cache_ttl.as_millis() as u64;
        let cached = self.base.read(|s| {
            s.tokens_chains_cache
                .get(&chain)
                .filter(|c| now_millis().saturating_sub(c.timestamp) < ttl_ms)
                .map(|c| c.data.clone())
        });

        if let Some(data) = cached {
            self.base.update(|state| state.token_list = data);
            return Ok(());
        }

        let entries = match self.source.fetch(chain).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(chain = %chain, error = %e, "Token list fetch failed");
                return Err(e);
            }
        };
        debug!(chain = %chain, count = entries.len(), "Token list fetched");
        let data: BTreeMap<Address, TokenListEntry> =
            entries.into_iter().map(|e| (e.address.clone(), e)).collect();

        self.base.update(|state| {
            state.token_list = data.clone();
            state.tokens_chains_cache.insert(
                chain,
                TokenListCache {
                    timestamp: now_millis(),
                    data,
                },
            );
        });
        Ok(())
    }

    /// Swap in the new chain's cached list; `fetch_token_list` refreshes it.
    pub fn on_network_change(&self) {
        let chain = (self.chain_id)();
        self.base.update(|state| {
            state.token_list = state
                .tokens_chains_cache
                .get(&chain)
                .map(|c| c.data.clone())
                .unwrap_or_default();
        });
    }

    pub fn clear(&self) {
        self.base.reset();
    }
}
