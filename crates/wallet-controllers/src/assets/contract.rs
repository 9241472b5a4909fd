//! Read-only ERC-20 contract access.

use crate::adapters::local_provider::{BALANCE_OF_SELECTOR, DECIMALS_SELECTOR};
use crate::errors::{ControllerError, ControllerResult};
use crate::ports::{Provider, ProviderSource};
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_types::{parse_quantity, Address, ChainId, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Stateless contract reader bound to the current provider.
pub struct AssetsContractController {
    provider: ProviderSource,
    chain_id: RwLock<ChainId>,
}

impl AssetsContractController {
    pub fn new(provider: ProviderSource, chain_id: ChainId) -> Arc<Self> {
        Arc::new(Self {
            provider,
            chain_id: RwLock::new(chain_id),
        })
    }

    /// Point at a new chain after a network switch.
    pub fn configure(&self, chain_id: ChainId) {
        *self.chain_id.write() = chain_id;
        debug!(chain = %chain_id, "Assets contract reconfigured");
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        *self.chain_id.read()
    }

    fn provider(&self) -> ControllerResult<Arc<dyn Provider>> {
        (self.provider)().ok_or(ControllerError::NoProvider)
    }

    async fn call_word(&self, to: &Address, data: String) -> ControllerResult<U256> {
        let result = self
            .provider()?
            .request("eth_call", json!([{ "to": to.as_str(), "data": data }, "latest"]))
            .await?;
        let word = result
            .as_str()
            .ok_or(ControllerError::UnexpectedResponse("eth_call"))?;
        Ok(parse_quantity(word)?)
    }

    /// Native balance in wei.
    pub async fn get_native_balance(&self, owner: &Address) -> ControllerResult<U256> {
        let result = self
            .provider()?
            .request("eth_getBalance", json!([owner.as_str(), "latest"]))
            .await?;
        let quantity = result
            .as_str()
            .ok_or(ControllerError::UnexpectedResponse("eth_getBalance"))?;
        Ok(parse_quantity(quantity)?)
    }

    /// `balanceOf(owner)` on an ERC-20 token.
    pub async fn get_erc20_balance(&self, token: &Address, owner: &Address) -> ControllerResult<U256> {
        self.call_word(token, format!("0x{BALANCE_OF_SELECTOR}{}", owner.to_abi_word()))
            .await
    }

    /// `decimals()` on an ERC-20 token.
    pub async fn get_erc20_decimals(&self, token: &Address) -> ControllerResult<u8> {
        let decimals = self.call_word(token, format!("0x{DECIMALS_SELECTOR}")).await?;
        u8::try_from(decimals.low_u64()).map_err(|_| ControllerError::UnexpectedResponse("decimals"))
    }

    /// Balances of several tokens. Tokens whose call fails are left out.
    pub async fn get_balances(
        &self,
        owner: &Address,
        tokens: &[Address],
    ) -> ControllerResult<BTreeMap<Address, U256>> {
        let mut balances = BTreeMap::new();
        for token in tokens {
            match self.get_erc20_balance(token, owner).await {
                Ok(balance) => {
                    balances.insert(token.clone(), balance);
                }
                Err(ControllerError::NoProvider) => return Err(ControllerError::NoProvider),
                Err(e) => debug!(token = %token, error = %e, "Balance call failed"),
            }
        }
        Ok(balances)
    }
}

/// Decode a JSON-RPC quantity or return zero.
pub(crate) fn quantity_or_zero(value: &Value) -> U256 {
    value
        .as_str()
        .and_then(|s| parse_quantity(s).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalProviderFactory;
    use crate::network::ProviderConfig;
    use crate::ports::ProviderFactory;

    #[tokio::test]
    async fn test_reads_balances_and_decimals() {
        let factory = LocalProviderFactory::default();
        let chain = factory.chain(ChainId::MAINNET);
        let token = Address::from_bytes([0xaa; 20]);
        let owner = Address::from_bytes([0x01; 20]);
        chain.set_token_balance(&token, &owner, U256::from(42u64));
        chain.set_token_decimals(&token, 6);
        chain.set_balance(&owner, U256::from(7u64));
        let provider = factory.create(&ProviderConfig::default()).unwrap();
        let contract = AssetsContractController::new(Arc::new(move || Some(provider.clone())), ChainId::MAINNET);

        assert_eq!(contract.get_erc20_balance(&token, &owner).await.unwrap(), U256::from(42u64));
        assert_eq!(contract.get_erc20_decimals(&token).await.unwrap(), 6);
        assert_eq!(contract.get_native_balance(&owner).await.unwrap(), U256::from(7u64));
    }

    #[tokio::test]
    async fn test_no_provider() {
        let contract = AssetsContractController::new(Arc::new(|| None), ChainId::MAINNET);
        let owner = Address::from_bytes([0x01; 20]);
        assert!(matches!(
            contract.get_native_balance(&owner).await,
            Err(ControllerError::NoProvider)
        ));
    }
}
