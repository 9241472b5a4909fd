//! # Token Rates Controller
//!
//! Token prices in the chain's native currency.

use super::tokens::TokensController;
use crate::base::{BaseController, ControllerState};
use crate::errors::ControllerResult;
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use crate::ports::{ChainIdSource, PriceSource};
use serde::{Deserialize, Serialize};
use shared_types::Address;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Token rates state slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRatesState {
    pub contract_exchange_rates: BTreeMap<Address, f64>,
}

impl ControllerState for TokenRatesState {
    const NAME: ControllerName = ControllerName::TokenRates;

    fn into_slice(self) -> StateSlice {
        StateSlice::TokenRates(self)
    }
}

pub struct TokenRatesController {
    base: BaseController<TokenRatesState>,
    tokens: Arc<TokensController>,
    source: Arc<dyn PriceSource>,
    chain_id: ChainIdSource,
}

impl TokenRatesController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        tokens: Arc<TokensController>,
        source: Arc<dyn PriceSource>,
        chain_id: ChainIdSource,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, TokenRatesState::default()),
            tokens,
            source,
            chain_id,
        })
    }

    #[must_use]
    pub fn state(&self) -> TokenRatesState {
        self.base.state()
    }

    /// Fetch prices of every tracked token. Tokens without a price are dropped.
    pub async fn update_exchange_rates(&self) -> ControllerResult<()> {
        let tokens: Vec<Address> = self.tokens.tokens().into_iter().map(|t| t.address).collect();
        if tokens.is_empty() {
            self.base.update(|state| state.contract_exchange_rates.clear());
            return Ok(());
        }

        let prices = self.source.token_prices((self.chain_id)(), &tokens).await?;
        let rates: BTreeMap<Address, f64> = tokens
            .into_iter()
            .filter_map(|t| prices.get(&t).copied().map(|p| (t, p)))
            .collect();
        debug!(count = rates.len(), "Token rates updated");
        self.base.update(|state| state.contract_exchange_rates = rates);
        Ok(())
    }

    pub fn clear(&self) {
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: TokenRatesState) {
        self.base.replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticPriceSource;
    use crate::assets::tokens::{Token, TokensState};
    use crate::test_support::{messenger_for, messenger_on};
    use shared_types::ChainId;

    #[tokio::test]
    async fn test_rates_only_for_priced_tokens() {
        let priced = Address::from_bytes([0xaa; 20]);
        let unpriced = Address::from_bytes([0xbb; 20]);
        let (bus, tokens_messenger) = messenger_for(ControllerName::Tokens, &[], &[]);
        let tokens = TokensController::new(
            tokens_messenger,
            Arc::new(|| ChainId::MAINNET),
            Arc::new(|| Some(Address::from_bytes([1; 20]))),
            TokensState::default(),
        );
        tokens.add_token(Token::new(priced.clone(), "AAA", 18)).unwrap();
        tokens.add_token(Token::new(unpriced.clone(), "BBB", 18)).unwrap();
        let source = Arc::new(StaticPriceSource::default().with_token_price(ChainId::MAINNET, priced.clone(), 0.5));

        let rates = TokenRatesController::new(
            messenger_on(&bus, ControllerName::TokenRates, &[], &[]),
            tokens,
            source,
            Arc::new(|| ChainId::MAINNET),
        );
        rates.update_exchange_rates().await.unwrap();

        let state = rates.state();
        assert_eq!(state.contract_exchange_rates.get(&priced), Some(&0.5));
        assert!(!state.contract_exchange_rates.contains_key(&unpriced));
    }
}
