//! # Gas Fee Controller
//!
//! Fee suggestions for the current network. EIP-1559 networks get
//! low/medium/high fee-market estimates derived from the latest base fee;
//! other networks get the node's gas price.

use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use crate::ports::{FlagSource, ProviderSource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::U256;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasEstimateType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "fee-market")]
    FeeMarket,
    #[serde(rename = "eth_gasPrice")]
    EthGasPrice,
}

/// One fee level, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLevel {
    pub suggested_max_priority_fee_per_gas: U256,
    pub suggested_max_fee_per_gas: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GasFeeEstimates {
    #[serde(rename_all = "camelCase")]
    FeeMarket {
        low: FeeLevel,
        medium: FeeLevel,
        high: FeeLevel,
        estimated_base_fee: U256,
    },
    #[serde(rename_all = "camelCase")]
    GasPrice { gas_price: U256 },
    Empty {},
}

impl Default for GasFeeEstimates {
    fn default() -> Self {
        Self::Empty {}
    }
}

/// Gas fee state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFeeState {
    pub gas_fee_estimates: GasFeeEstimates,
    pub gas_estimate_type: GasEstimateType,
}

impl ControllerState for GasFeeState {
    const NAME: ControllerName = ControllerName::GasFee;

    fn into_slice(self) -> StateSlice {
        StateSlice::GasFee(self)
    }
}

/// (priority multiplier %, base fee multiplier %) per level.
const LEVELS: [(u64, u64); 3] = [(100, 110), (150, 120), (200, 125)];

pub struct GasFeeController {
    base: BaseController<GasFeeState>,
    provider: ProviderSource,
    eip1559_compatible: FlagSource,
}

impl GasFeeController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        provider: ProviderSource,
        eip1559_compatible: FlagSource,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, GasFeeState::default()),
            provider,
            eip1559_compatible,
        })
    }

    #[must_use]
    pub fn state(&self) -> GasFeeState {
        self.base.state()
    }

    pub async fn fetch_gas_fee_estimates(&self) -> ControllerResult<GasFeeState> {
        let provider = (self.provider)().ok_or(ControllerError::NoProvider)?;

        let next = if (self.eip1559_compatible)() {
            let block = provider
                .request("eth_getBlockByNumber", json!(["latest", false]))
                .await?;
            let base_fee = block
                .get("baseFeePerGas")
                .map(crate::assets::contract::quantity_or_zero)
                .unwrap_or_default();
            let priority = crate::assets::contract::quantity_or_zero(
                &provider.request("eth_maxPriorityFeePerGas", json!([])).await?,
            );
            let level = |(priority_pct, base_pct): (u64, u64)| {
                let tip = priority * priority_pct / 100;
                FeeLevel {
                    suggested_max_priority_fee_per_gas: tip,
                    suggested_max_fee_per_gas: base_fee * base_pct / 100 + tip,
                }
            };
            GasFeeState {
                gas_fee_estimates: GasFeeEstimates::FeeMarket {
                    low: level(LEVELS[0]),
                    medium: level(LEVELS[1]),
                    high: level(LEVELS[2]),
                    estimated_base_fee: base_fee,
                },
                gas_estimate_type: GasEstimateType::FeeMarket,
            }
        } else {
            let gas_price =
                crate::assets::contract::quantity_or_zero(&provider.request("eth_gasPrice", json!([])).await?);
            GasFeeState {
                gas_fee_estimates: GasFeeEstimates::GasPrice { gas_price },
                gas_estimate_type: GasEstimateType::EthGasPrice,
            }
        };

        debug!(kind = ?next.gas_estimate_type, "Gas fee estimates updated");
        self.base.replace(next.clone());
        Ok(next)
    }

    /// Forget estimates, e.g. after a network switch.
    pub fn reset(&self) {
        self.base.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalProviderFactory;
    use crate::network::ProviderConfig;
    use crate::ports::ProviderFactory;
    use crate::test_support::messenger_for;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_fee_market_then_legacy() {
        let factory = LocalProviderFactory::default();
        let provider = factory.create(&ProviderConfig::default()).unwrap();
        let (_bus, messenger) = messenger_for(ControllerName::GasFee, &[], &[]);
        let eip1559 = Arc::new(AtomicBool::new(true));
        let flag = eip1559.clone();
        let gas = GasFeeController::new(
            messenger,
            Arc::new(move || Some(provider.clone())),
            Arc::new(move || flag.load(Ordering::SeqCst)),
        );

        let state = gas.fetch_gas_fee_estimates().await.unwrap();
        assert_eq!(state.gas_estimate_type, GasEstimateType::FeeMarket);
        let GasFeeEstimates::FeeMarket { low, high, .. } = state.gas_fee_estimates else {
            panic!("expected fee market estimates");
        };
        assert!(high.suggested_max_fee_per_gas > low.suggested_max_fee_per_gas);

        eip1559.store(false, Ordering::SeqCst);
        let state = gas.fetch_gas_fee_estimates().await.unwrap();
        assert_eq!(state.gas_estimate_type, GasEstimateType::EthGasPrice);
    }
}
