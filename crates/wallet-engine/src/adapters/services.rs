//! External collaborators handed to the engine at construction.

use crate::adapters::backup_store::{FileVaultBackup, InMemoryVaultBackup, VaultBackupStore};
use crate::adapters::notifications::{LogNotificationSink, NotificationSink};
use crate::container::EngineConfig;
use std::sync::Arc;
use wallet_controllers::adapters::{
    InProcessExecutionService, LocalProviderFactory, StaticIncomingTransactionSource, StaticNftSource,
    StaticPhishingListSource, StaticPriceSource, StaticSwapsQuoteSource, StaticTokenListSource, TracingAnalytics,
};
use wallet_controllers::ports::{
    AnalyticsSink, ExecutionService, IncomingTransactionSource, NftSource, PhishingListSource, PriceSource,
    ProviderFactory, SwapsQuoteSource, TokenListSource,
};

/// Every outbound dependency of the engine.
#[derive(Clone)]
pub struct EngineServices {
    pub provider_factory: Arc<dyn ProviderFactory>,
    pub prices: Arc<dyn PriceSource>,
    pub token_lists: Arc<dyn TokenListSource>,
    pub nfts: Arc<dyn NftSource>,
    pub phishing_lists: Arc<dyn PhishingListSource>,
    pub incoming_transactions: Arc<dyn IncomingTransactionSource>,
    pub swaps_quotes: Arc<dyn SwapsQuoteSource>,
    pub snap_execution: Arc<dyn ExecutionService>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub vault_backup: Arc<dyn VaultBackupStore>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl EngineServices {
    /// In-memory chain and fixed data sources.
    ///
    /// The vault backup goes to `config.backup.path` when set.
    #[must_use]
    pub fn local(config: &EngineConfig) -> Self {
        let vault_backup: Arc<dyn VaultBackupStore> = match &config.backup.path {
            Some(path) => Arc::new(FileVaultBackup::new(path.clone())),
            None => Arc::new(InMemoryVaultBackup::default()),
        };
        Self {
            provider_factory: Arc::new(LocalProviderFactory::default()),
            prices: Arc::new(StaticPriceSource::default().with_rate("ETH", "usd", 2_000.0)),
            token_lists: Arc::new(StaticTokenListSource::default()),
            nfts: Arc::new(StaticNftSource::default()),
            phishing_lists: Arc::new(StaticPhishingListSource::default()),
            incoming_transactions: Arc::new(StaticIncomingTransactionSource::default()),
            swaps_quotes: Arc::new(StaticSwapsQuoteSource::default()),
            snap_execution: Arc::new(InProcessExecutionService::default()),
            analytics: Arc::new(TracingAnalytics),
            vault_backup,
            notifications: Arc::new(LogNotificationSink),
        }
    }
}

impl std::fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineServices").finish_non_exhaustive()
    }
}
