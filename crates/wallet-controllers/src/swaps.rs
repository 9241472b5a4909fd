//! # Swaps Controller
//!
//! Fetches swap quotes from an aggregator source and picks the best one.

use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use crate::ports::SwapsQuoteSource;
use crate::transaction::TransactionParams;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::{now_millis, Address, ChainId, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Chains with swap liquidity.
pub const SWAPS_SUPPORTED_CHAINS: &[ChainId] = &[
    ChainId::MAINNET,
    ChainId::BSC,
    ChainId::POLYGON,
    ChainId(43114),
    ChainId(42161),
    ChainId(10),
    ChainId::LINEA_MAINNET,
];

#[must_use]
pub fn is_swaps_supported(chain_id: ChainId) -> bool {
    SWAPS_SUPPORTED_CHAINS.contains(&chain_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub source_token: Address,
    pub destination_token: Address,
    pub source_amount: U256,
    pub from_address: Address,
    /// Percent, e.g. `2.0`.
    pub slippage: f64,
    pub chain_id: ChainId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub aggregator: String,
    pub destination_amount: U256,
    pub gas_estimate: U256,
    pub trade: TransactionParams,
}

/// Swaps state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapsState {
    pub quotes: BTreeMap<String, Quote>,
    pub top_aggregator_id: Option<String>,
    pub quotes_last_fetched: u64,
    pub error: Option<String>,
}

impl ControllerState for SwapsState {
    const NAME: ControllerName = ControllerName::Swaps;

    fn into_slice(self) -> StateSlice {
        StateSlice::Swaps(self)
    }
}

pub struct SwapsController {
    base: BaseController<SwapsState>,
    source: Arc<dyn SwapsQuoteSource>,
    chain_id: RwLock<ChainId>,
}

impl SwapsController {
    pub fn new(messenger: Arc<ControllerMessenger>, source: Arc<dyn SwapsQuoteSource>, chain_id: ChainId) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, SwapsState::default()),
            source,
            chain_id: RwLock::new(chain_id),
        })
    }

    #[must_use]
    pub fn state(&self) -> SwapsState {
        self.base.state()
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        *self.chain_id.read()
    }

    /// Follow a network switch. Quotes for the old chain are dropped.
    pub fn configure(&self, chain_id: ChainId) {
        let previous = std::mem::replace(&mut *self.chain_id.write(), chain_id);
        if previous != chain_id {
            debug!(chain_id = %chain_id, "Swaps reconfigured");
            self.base.reset();
        }
    }

    /// Fetch quotes and select the one with the largest output.
    ///
    /// Returns the top aggregator, if any quote came back.
    pub async fn fetch_and_set_quotes(&self, request: &QuoteRequest) -> ControllerResult<Option<String>> {
        let chain_id = self.chain_id();
        if request.chain_id != chain_id || !is_swaps_supported(chain_id) {
            return Err(ControllerError::Disabled(format!("swaps are not available on {chain_id}")));
        }

        let quotes = match self.source.quotes(request).await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "Swap quote fetch failed");
                self.base.update(|state| state.error = Some(e.to_string()));
                return Err(e);
            }
        };

        let top = quotes
            .iter()
            .max_by_key(|q| q.destination_amount)
            .map(|q| q.aggregator.clone());
        self.base.replace(SwapsState {
            quotes: quotes.into_iter().map(|q| (q.aggregator.clone(), q)).collect(),
            top_aggregator_id: top.clone(),
            quotes_last_fetched: now_millis(),
            error: None,
        });
        Ok(top)
    }

    pub fn stop_polling_and_reset_state(&self) {
        self.base.reset();
    }
}
