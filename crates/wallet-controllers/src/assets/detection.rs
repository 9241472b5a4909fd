//! Token and NFT auto-detection.
//!
//! Neither controller owns state: found assets are handed to the tokens and
//! NFT controllers. Detection is skipped while the matching preference is off
//! or the current chain has no detection support.

use super::contract::AssetsContractController;
use super::nft::NftController;
use super::tokens::{Token, TokensController};
use super::token_list::TokenListController;
use crate::errors::{ControllerError, ControllerResult};
use crate::ports::{ChainIdSource, FlagSource, NftSource, SelectedAddressSource};
use shared_types::{Address, ChainId};
use std::sync::Arc;
use tracing::{debug, info};

/// Chains with a curated token list.
pub const TOKEN_DETECTION_CHAINS: [ChainId; 7] = [
    ChainId::MAINNET,
    ChainId::BSC,
    ChainId::POLYGON,
    ChainId(43_114),
    ChainId(42_161),
    ChainId(10),
    ChainId::LINEA_MAINNET,
];

#[must_use]
pub fn is_token_detection_supported(chain_id: ChainId) -> bool {
    TOKEN_DETECTION_CHAINS.contains(&chain_id)
}

pub struct TokenDetectionController {
    token_list: Arc<TokenListController>,
    contract: Arc<AssetsContractController>,
    tokens: Arc<TokensController>,
    chain_id: ChainIdSource,
    selected_address: SelectedAddressSource,
    enabled: FlagSource,
}

impl TokenDetectionController {
    pub fn new(
        token_list: Arc<TokenListController>,
        contract: Arc<AssetsContractController>,
        tokens: Arc<TokensController>,
        chain_id: ChainIdSource,
        selected_address: SelectedAddressSource,
        enabled: FlagSource,
    ) -> Arc<Self> {
        Arc::new(Self {
            token_list,
            contract,
            tokens,
            chain_id,
            selected_address,
            enabled,
        })
    }

    /// Look for list tokens with a non-zero balance. Returns how many were
    /// handed to the tokens controller.
    pub async fn detect_tokens(&self) -> ControllerResult<usize> {
        let chain = (self.chain_id)();
        if !(self.enabled)() || !is_token_detection_supported(chain) {
            debug!(chain = %chain, "Token detection skipped");
            return Ok(0);
        }
        let owner = (self.selected_address)()
            .ok_or_else(|| ControllerError::InvalidParams("no account selected".into()))?;

        let state = self.tokens.state();
        let known: Vec<Address> = state
            .tokens
            .iter()
            .chain(state.detected_tokens.iter())
            .map(|t| t.address.clone())
            .chain(state.ignored_tokens.iter().cloned())
            .collect();

        let candidates: Vec<_> = self
            .token_list
            .entries()
            .into_iter()
            .filter(|entry| !known.contains(&entry.address))
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let addresses: Vec<Address> = candidates.iter().map(|e| e.address.clone()).collect();
        let balances = self.contract.get_balances(&owner, &addresses).await?;

        let found: Vec<Token> = candidates
            .into_iter()
            .filter(|entry| balances.get(&entry.address).is_some_and(|b| !b.is_zero()))
            .map(|entry| Token {
                address: entry.address,
                symbol: entry.symbol,
                decimals: entry.decimals,
                image: entry.icon_url,
                name: Some(entry.name),
                aggregators: entry.aggregators,
                is_erc721: false,
            })
            .collect();

        let count = found.len();
        if count > 0 {
            info!(chain = %chain, count, "Tokens detected");
            self.tokens.add_detected_tokens(found)?;
        }
        Ok(count)
    }

    /// Re-run detection after a network or account switch.
    pub async fn restart(&self) {
        if let Err(e) = self.detect_tokens().await {
            debug!(error = %e, "Token detection restart failed");
        }
    }
}

pub struct NftDetectionController {
    source: Arc<dyn NftSource>,
    nfts: Arc<NftController>,
    chain_id: ChainIdSource,
    selected_address: SelectedAddressSource,
    enabled: FlagSource,
}

impl NftDetectionController {
    pub fn new(
        source: Arc<dyn NftSource>,
        nfts: Arc<NftController>,
        chain_id: ChainIdSource,
        selected_address: SelectedAddressSource,
        enabled: FlagSource,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            nfts,
            chain_id,
            selected_address,
            enabled,
        })
    }

    /// NFT detection only runs on mainnet.
    pub async fn detect_nfts(&self) -> ControllerResult<usize> {
        let chain = (self.chain_id)();
        if !(self.enabled)() || chain != ChainId::MAINNET {
            return Ok(0);
        }
        let owner = (self.selected_address)()
            .ok_or_else(|| ControllerError::InvalidParams("no account selected".into()))?;

        let owned = self.source.owned_nfts(&owner, chain).await?;
        let count = owned.len();
        for nft in owned {
            self.nfts.add_nft(nft)?;
        }
        debug!(count, "NFT detection finished");
        Ok(count)
    }
}
