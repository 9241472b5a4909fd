//! # Account Tracker Controller
//!
//! Native balances of every identity, per chain.

use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use crate::ports::ProviderSource;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::{parse_quantity, to_quantity, Address, ChainId, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Accounts the tracker follows.
pub type IdentitiesSource = Arc<dyn Fn() -> Vec<Address> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Wei as a `0x` quantity.
    pub balance: String,
}

impl AccountInfo {
    #[must_use]
    pub fn balance_wei(&self) -> U256 {
        parse_quantity(&self.balance).unwrap_or_default()
    }
}

/// Account tracker state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTrackerState {
    pub accounts: BTreeMap<Address, AccountInfo>,
    pub accounts_by_chain_id: BTreeMap<ChainId, BTreeMap<Address, AccountInfo>>,
}

impl ControllerState for AccountTrackerState {
    const NAME: ControllerName = ControllerName::AccountTracker;

    fn into_slice(self) -> StateSlice {
        StateSlice::AccountTracker(self)
    }
}

pub struct AccountTrackerController {
    base: BaseController<AccountTrackerState>,
    provider: ProviderSource,
    identities: IdentitiesSource,
    chain_id: RwLock<ChainId>,
}

impl AccountTrackerController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        provider: ProviderSource,
        identities: IdentitiesSource,
        chain_id: ChainId,
        initial: AccountTrackerState,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
            provider,
            identities,
            chain_id: RwLock::new(chain_id),
        })
    }

    #[must_use]
    pub fn state(&self) -> AccountTrackerState {
        self.base.state()
    }

    /// Point at a new chain; `accounts` switches to that chain's cached view.
    pub fn configure(&self, chain_id: ChainId) {
        *self.chain_id.write() = chain_id;
        self.base.update(|state| {
            state.accounts = state
                .accounts_by_chain_id
                .get(&chain_id)
                .cloned()
                .unwrap_or_default();
        });
        debug!(chain = %chain_id, "Account tracker reconfigured");
    }

    /// Fetch the native balance of every identity.
    pub async fn refresh(&self) -> ControllerResult<()> {
        let provider = (self.provider)().ok_or(ControllerError::NoProvider)?;
        let chain = *self.chain_id.read();
        let addresses = (self.identities)();

        let mut fetched = BTreeMap::new();
        for address in addresses {
            match provider
                .request("eth_getBalance", json!([address.as_str(), "latest"]))
                .await
            {
                Ok(value) => {
                    let balance = value
                        .as_str()
                        .and_then(|q| parse_quantity(q).ok())
                        .unwrap_or_default();
                    fetched.insert(
                        address,
                        AccountInfo {
                            balance: to_quantity(balance),
                        },
                    );
                }
                Err(e) => warn!(account = %address, error = %e, "Balance refresh failed"),
            }
        }

        self.base.update(|state| {
            state.accounts_by_chain_id.insert(chain, fetched.clone());
            if *self.chain_id.read() == chain {
                state.accounts = fetched;
            }
        });
        Ok(())
    }

    /// Native balance of `address` on the configured chain.
    #[must_use]
    pub fn balance_of(&self, address: &Address) -> Option<U256> {
        self.base
            .read(|s| s.accounts.get(address).map(AccountInfo::balance_wei))
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: AccountTrackerState) {
        self.base.replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalProviderFactory;
    use crate::network::ProviderConfig;
    use crate::ports::ProviderFactory;
    use crate::test_support::messenger_for;

    #[tokio::test]
    async fn test_refresh_reads_balances_per_chain() {
        let factory = LocalProviderFactory::default();
        let account = Address::from_bytes([3; 20]);
        factory
            .chain(ChainId::MAINNET)
            .set_balance(&account, U256::from(1_000u64));
        let provider = factory.create(&ProviderConfig::default()).unwrap();
        let (_bus, messenger) = messenger_for(ControllerName::AccountTracker, &[], &[]);
        let listed = account.clone();
        let tracker = AccountTrackerController::new(
            messenger,
            Arc::new(move || Some(provider.clone())),
            Arc::new(move || vec![listed.clone()]),
            ChainId::MAINNET,
            AccountTrackerState::default(),
        );

        tracker.refresh().await.unwrap();
        assert_eq!(tracker.balance_of(&account), Some(U256::from(1_000u64)));

        tracker.configure(ChainId::POLYGON);
        assert_eq!(tracker.balance_of(&account), None);
    }
}
