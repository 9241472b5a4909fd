//! # Ports
//!
//! Outbound dependencies of the controllers. Chain access, price feeds and
//! list downloads are reached through these traits so the engine can run
//! against in-memory adapters in tests and against real services in an app.
//!
//! Accessor closures (`ProviderSource`, `ChainIdSource`, ...) are how one
//! controller observes another's current value without holding a reference
//! to it.

use crate::assets::nft::Nft;
use crate::assets::token_list::TokenListEntry;
use crate::errors::ControllerError;
use crate::network::ProviderConfig;
use crate::phishing::PhishingLists;
use crate::swaps::{Quote, QuoteRequest};
use crate::transaction::{TransactionMeta, TransactionParams};
use async_trait::async_trait;
use serde_json::Value;
use shared_types::{Address, ChainId, RpcError};
use std::collections::HashMap;
use std::sync::Arc;

/// JSON-RPC access to one chain.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send a JSON-RPC request.
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Chain this provider talks to.
    fn chain_id(&self) -> ChainId;
}

/// Builds a provider for a network configuration.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ControllerError>;
}

/// Current provider, if the network controller has one.
pub type ProviderSource = Arc<dyn Fn() -> Option<Arc<dyn Provider>> + Send + Sync>;

/// Currently selected chain.
pub type ChainIdSource = Arc<dyn Fn() -> ChainId + Send + Sync>;

/// Currently selected account.
pub type SelectedAddressSource = Arc<dyn Fn() -> Option<Address> + Send + Sync>;

/// Feature toggle read at call time.
pub type FlagSource = Arc<dyn Fn() -> bool + Send + Sync>;

/// Signs transactions on behalf of the transaction controller.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Return the raw signed transaction bytes.
    async fn sign_transaction(
        &self,
        tx: &TransactionParams,
        chain_id: ChainId,
    ) -> Result<Vec<u8>, ControllerError>;
}

/// Fiat and token price feed.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Price of one unit of `native` in `fiat`.
    async fn conversion_rate(&self, native: &str, fiat: &str) -> Result<f64, ControllerError>;

    /// Token prices denominated in the chain's native currency.
    async fn token_prices(
        &self,
        chain_id: ChainId,
        tokens: &[Address],
    ) -> Result<HashMap<Address, f64>, ControllerError>;
}

/// Token list per chain.
#[async_trait]
pub trait TokenListSource: Send + Sync {
    async fn fetch(&self, chain_id: ChainId) -> Result<Vec<TokenListEntry>, ControllerError>;
}

/// NFT ownership lookup.
#[async_trait]
pub trait NftSource: Send + Sync {
    async fn owned_nfts(&self, owner: &Address, chain_id: ChainId) -> Result<Vec<Nft>, ControllerError>;
}

/// Phishing list download.
#[async_trait]
pub trait PhishingListSource: Send + Sync {
    async fn fetch(&self) -> Result<PhishingLists, ControllerError>;
}

/// Incoming transaction history (block explorer).
#[async_trait]
pub trait IncomingTransactionSource: Send + Sync {
    /// Transactions to `address` on `chain_id` mined at or after `from_block`.
    async fn fetch(
        &self,
        address: &Address,
        chain_id: ChainId,
        from_block: Option<u64>,
    ) -> Result<Vec<TransactionMeta>, ControllerError>;
}

/// Swap quote aggregator.
#[async_trait]
pub trait SwapsQuoteSource: Send + Sync {
    async fn quotes(&self, request: &QuoteRequest) -> Result<Vec<Quote>, ControllerError>;
}

/// Receives analytics events. Never fails the caller.
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, event: &str, properties: Value);
}

/// Runs snap code.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn execute(&self, snap_id: &str, method: &str, params: Value) -> Result<Value, ControllerError>;

    async fn terminate(&self, snap_id: &str);
}
