//! Fixed-data implementations of the source ports.

use crate::assets::nft::Nft;
use crate::assets::token_list::TokenListEntry;
use crate::errors::ControllerError;
use crate::phishing::PhishingLists;
use crate::ports::{
    AnalyticsSink, IncomingTransactionSource, NftSource, PhishingListSource, PriceSource, SwapsQuoteSource,
    TokenListSource,
};
use crate::swaps::{Quote, QuoteRequest};
use crate::transaction::TransactionMeta;
use async_trait::async_trait;
use serde_json::Value;
use shared_types::{Address, ChainId};
use std::collections::HashMap;
use tracing::debug;

/// Prices keyed by `(native, fiat)` ticker pair and by token.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    rates: HashMap<(String, String), f64>,
    token_prices: HashMap<(ChainId, Address), f64>,
}

impl StaticPriceSource {
    #[must_use]
    pub fn with_rate(mut self, native: &str, fiat: &str, rate: f64) -> Self {
        self.rates
            .insert((native.to_ascii_uppercase(), fiat.to_ascii_uppercase()), rate);
        self
    }

    #[must_use]
    pub fn with_token_price(mut self, chain_id: ChainId, token: Address, price: f64) -> Self {
        self.token_prices.insert((chain_id, token), price);
        self
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn conversion_rate(&self, native: &str, fiat: &str) -> Result<f64, ControllerError> {
        self.rates
            .get(&(native.to_ascii_uppercase(), fiat.to_ascii_uppercase()))
            .copied()
            .ok_or_else(|| ControllerError::Source(format!("no {native}/{fiat} rate")))
    }

    async fn token_prices(
        &self,
        chain_id: ChainId,
        tokens: &[Address],
    ) -> Result<HashMap<Address, f64>, ControllerError> {
        Ok(tokens
            .iter()
            .filter_map(|t| {
                self.token_prices
                    .get(&(chain_id, t.clone()))
                    .map(|price| (t.clone(), *price))
            })
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticTokenListSource {
    lists: HashMap<ChainId, Vec<TokenListEntry>>,
}

impl StaticTokenListSource {
    #[must_use]
    pub fn with_chain(mut self, chain_id: ChainId, tokens: Vec<TokenListEntry>) -> Self {
        self.lists.insert(chain_id, tokens);
        self
    }
}

#[async_trait]
impl TokenListSource for StaticTokenListSource {
    async fn fetch(&self, chain_id: ChainId) -> Result<Vec<TokenListEntry>, ControllerError> {
        Ok(self.lists.get(&chain_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticNftSource {
    owned: HashMap<Address, Vec<Nft>>,
}

impl StaticNftSource {
    #[must_use]
    pub fn with_nft(mut self, owner: Address, nft: Nft) -> Self {
        self.owned.entry(owner).or_default().push(nft);
        self
    }
}

#[async_trait]
impl NftSource for StaticNftSource {
    async fn owned_nfts(&self, owner: &Address, _chain_id: ChainId) -> Result<Vec<Nft>, ControllerError> {
        Ok(self.owned.get(owner).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticPhishingListSource {
    lists: PhishingLists,
}

impl StaticPhishingListSource {
    #[must_use]
    pub fn new(lists: PhishingLists) -> Self {
        Self { lists }
    }
}

#[async_trait]
impl PhishingListSource for StaticPhishingListSource {
    async fn fetch(&self) -> Result<PhishingLists, ControllerError> {
        Ok(self.lists.clone())
    }
}

/// Incoming history; filters by chain and starting block.
#[derive(Debug, Clone, Default)]
pub struct StaticIncomingTransactionSource {
    transactions: Vec<TransactionMeta>,
}

impl StaticIncomingTransactionSource {
    #[must_use]
    pub fn with_transactions(mut self, transactions: Vec<TransactionMeta>) -> Self {
        self.transactions.extend(transactions);
        self
    }
}

#[async_trait]
impl IncomingTransactionSource for StaticIncomingTransactionSource {
    async fn fetch(
        &self,
        _address: &Address,
        chain_id: ChainId,
        from_block: Option<u64>,
    ) -> Result<Vec<TransactionMeta>, ControllerError> {
        let from = from_block.unwrap_or_default();
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.chain_id == chain_id && t.block_number.unwrap_or_default() >= from)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticSwapsQuoteSource {
    quotes: Vec<Quote>,
}

impl StaticSwapsQuoteSource {
    #[must_use]
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self { quotes }
    }
}

#[async_trait]
impl SwapsQuoteSource for StaticSwapsQuoteSource {
    async fn quotes(&self, _request: &QuoteRequest) -> Result<Vec<Quote>, ControllerError> {
        Ok(self.quotes.clone())
    }
}

/// Analytics sink that only traces events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn track(&self, event: &str, properties: Value) {
        debug!(event, %properties, "Analytics event");
    }
}
