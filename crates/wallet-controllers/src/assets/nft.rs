//! # NFT Controller
//!
//! Collectibles per account and chain.

use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use crate::ports::{ChainIdSource, SelectedAddressSource};
use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nft {
    pub address: Address,
    pub token_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub standard: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default = "default_true")]
    pub is_current_owner: bool,
}

fn default_true() -> bool {
    true
}

impl Nft {
    pub fn erc721(address: Address, token_id: impl Into<String>) -> Self {
        Self {
            address,
            token_id: token_id.into(),
            name: None,
            image: None,
            standard: "ERC721".to_string(),
            favorite: false,
            is_current_owner: true,
        }
    }

    fn same_as(&self, address: &Address, token_id: &str) -> bool {
        &self.address == address && self.token_id == token_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftContract {
    pub address: Address,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

type ByAccount<T> = BTreeMap<Address, BTreeMap<ChainId, Vec<T>>>;

/// NFT state slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftState {
    pub all_nfts: ByAccount<Nft>,
    pub all_nft_contracts: ByAccount<NftContract>,
    pub ignored_nfts: Vec<Nft>,
}

impl ControllerState for NftState {
    const NAME: ControllerName = ControllerName::Nft;

    fn into_slice(self) -> StateSlice {
        StateSlice::Nft(self)
    }
}

impl NftState {
    /// NFTs of one account on one chain.
    #[must_use]
    pub fn nfts_for(&self, account: &Address, chain: ChainId) -> Vec<Nft> {
        self.all_nfts
            .get(account)
            .and_then(|m| m.get(&chain))
            .cloned()
            .unwrap_or_default()
    }
}

pub struct NftController {
    base: BaseController<NftState>,
    chain_id: ChainIdSource,
    selected_address: SelectedAddressSource,
}

impl NftController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        chain_id: ChainIdSource,
        selected_address: SelectedAddressSource,
        initial: NftState,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
            chain_id,
            selected_address,
        })
    }

    #[must_use]
    pub fn state(&self) -> NftState {
        self.base.state()
    }

    fn current(&self) -> ControllerResult<(ChainId, Address)> {
        let account = (self.selected_address)()
            .ok_or_else(|| ControllerError::InvalidParams("no account selected".into()))?;
        Ok(((self.chain_id)(), account))
    }

    /// NFTs of the selected account on the current chain.
    #[must_use]
    pub fn current_nfts(&self) -> Vec<Nft> {
        match self.current() {
            Ok((chain, account)) => self.base.read(|s| s.nfts_for(&account, chain)),
            Err(_) => Vec::new(),
        }
    }

    /// Add (or refresh) an NFT for the selected account.
    pub fn add_nft(&self, nft: Nft) -> ControllerResult<()> {
        let (chain, account) = self.current()?;
        self.base.update(|state| {
            if state
                .ignored_nfts
                .iter()
                .any(|n| n.same_as(&nft.address, &nft.token_id))
            {
                return;
            }
            let contracts = state
                .all_nft_contracts
                .entry(account.clone())
                .or_default()
                .entry(chain)
                .or_default();
            if !contracts.iter().any(|c| c.address == nft.address) {
                contracts.push(NftContract {
                    address: nft.address.clone(),
                    name: nft.name.clone(),
                    symbol: None,
                });
            }
            let nfts = state.all_nfts.entry(account).or_default().entry(chain).or_default();
            nfts.retain(|n| !n.same_as(&nft.address, &nft.token_id));
            nfts.push(nft);
        });
        Ok(())
    }

    /// Remove an NFT and remember not to re-add it.
    pub fn remove_and_ignore_nft(&self, address: &Address, token_id: &str) -> ControllerResult<()> {
        let (chain, account) = self.current()?;
        self.base.update(|state| {
            if let Some(nfts) = state.all_nfts.get_mut(&account).and_then(|m| m.get_mut(&chain)) {
                if let Some(pos) = nfts.iter().position(|n| n.same_as(address, token_id)) {
                    let removed = nfts.remove(pos);
                    state.ignored_nfts.push(removed);
                }
            }
        });
        Ok(())
    }

    /// Clear every NFT, contract and ignore entry.
    pub fn clear(&self) {
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: NftState) {
        self.base.replace(next);
    }
}
