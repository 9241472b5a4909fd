//! # Token Balances Controller
//!
//! ERC-20 balances of the selected account for every tracked token.

use super::contract::AssetsContractController;
use super::tokens::TokensController;
use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use crate::ports::SelectedAddressSource;
use serde::{Deserialize, Serialize};
use shared_types::{parse_quantity, to_quantity, Address, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Token balances state slice. Balances are `0x` quantities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalancesState {
    pub contract_balances: BTreeMap<Address, String>,
}

impl TokenBalancesState {
    #[must_use]
    pub fn balance_of(&self, token: &Address) -> Option<U256> {
        self.contract_balances
            .get(token)
            .and_then(|q| parse_quantity(q).ok())
    }
}

impl ControllerState for TokenBalancesState {
    const NAME: ControllerName = ControllerName::TokenBalances;

    fn into_slice(self) -> StateSlice {
        StateSlice::TokenBalances(self)
    }
}

pub struct TokenBalancesController {
    base: BaseController<TokenBalancesState>,
    tokens: Arc<TokensController>,
    contract: Arc<AssetsContractController>,
    selected_address: SelectedAddressSource,
    interval: Duration,
}

impl TokenBalancesController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        tokens: Arc<TokensController>,
        contract: Arc<AssetsContractController>,
        selected_address: SelectedAddressSource,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, TokenBalancesState::default()),
            tokens,
            contract,
            selected_address,
            interval,
        })
    }

    #[must_use]
    pub fn state(&self) -> TokenBalancesState {
        self.base.state()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Re-read the balance of every tracked token.
    pub async fn update_balances(&self) -> ControllerResult<()> {
        let owner = (self.selected_address)()
            .ok_or_else(|| ControllerError::InvalidParams("no account selected".into()))?;
        let tokens: Vec<Address> = self.tokens.tokens().into_iter().map(|t| t.address).collect();
        if tokens.is_empty() {
            return Ok(());
        }

        let balances = self.contract.get_balances(&owner, &tokens).await?;
        debug!(count = balances.len(), "Token balances updated");
        self.base.update(|state| {
            state.contract_balances = balances
                .into_iter()
                .map(|(token, balance)| (token, to_quantity(balance)))
                .collect();
        });
        Ok(())
    }

    pub fn clear(&self) {
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: TokenBalancesState) {
        self.base.replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalProviderFactory;
    use crate::assets::tokens::{Token, TokensState};
    use crate::network::ProviderConfig;
    use crate::ports::ProviderFactory;
    use crate::test_support::{messenger_for, messenger_on};
    use shared_types::ChainId;

    #[tokio::test]
    async fn test_update_then_clear() {
        let owner = Address::from_bytes([0x01; 20]);
        let token = Address::from_bytes([0xaa; 20]);
        let factory = LocalProviderFactory::default();
        factory
            .chain(ChainId::MAINNET)
            .set_token_balance(&token, &owner, U256::from(250u64));
        let provider = factory.create(&ProviderConfig::default()).unwrap();
        let contract = AssetsContractController::new(Arc::new(move || Some(provider.clone())), ChainId::MAINNET);

        let (bus, tokens_messenger) = messenger_for(ControllerName::Tokens, &[], &[]);
        let selected = owner.clone();
        let tokens = TokensController::new(
            tokens_messenger,
            Arc::new(|| ChainId::MAINNET),
            Arc::new(move || Some(selected.clone())),
            TokensState::default(),
        );
        tokens.add_token(Token::new(token.clone(), "AAA", 18)).unwrap();

        let selected = owner.clone();
        let balances = TokenBalancesController::new(
            messenger_on(&bus, ControllerName::TokenBalances, &[], &[]),
            tokens,
            contract,
            Arc::new(move || Some(selected.clone())),
            DEFAULT_INTERVAL,
        );

        balances.update_balances().await.unwrap();
        assert_eq!(balances.state().balance_of(&token), Some(U256::from(250u64)));

        balances.clear();
        assert!(balances.state().contract_balances.is_empty());
    }
}
