//! # Engine Configuration
//!
//! Plain structs with defaults. `EngineConfig::from_env` overrides them from
//! the process environment; `apply_env` does the same from any lookup so the
//! parsing can be exercised without touching the real environment.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `MM_INFURA_PROJECT_ID` | `network.infura_project_id` |
//! | `MM_OPENSEA_KEY` | `api_keys.opensea` |
//! | `MM_ETHERSCAN_KEY` | `api_keys.etherscan` |
//! | `MM_BLOCKAID_UI_ENABLED` / `WALLET_SECURITY_ALERTS_ENABLED` | `security.alerts_enabled` |
//! | `BLOCKAID_PUBLIC_KEY` | `security.public_key` |
//! | `BLOCKAID_FILE_CDN` | `security.cdn_base_url` |
//! | `WALLET_VAULT_BACKUP_PATH` | `backup.path` |
//! | `WALLET_SETTLE_DELAY_MS` | `settle_delay` |
//! | `WALLET_SWAPS_ENABLED` | `swaps.enabled` |

use shared_crypto::KdfParams;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use wallet_controllers::assets::balances::DEFAULT_INTERVAL as TOKEN_BALANCES_INTERVAL;
use wallet_controllers::assets::currency_rate::POLLING_INTERVAL as CURRENCY_RATE_INTERVAL;
use wallet_controllers::security::PpomConfig;

/// Delay between a network switch and the reconfiguration of dependents.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Chain access.
    pub network: NetworkSettings,
    /// Background refresh intervals.
    pub polling: PollingConfig,
    /// Swaps availability.
    pub swaps: SwapsConfig,
    /// Security alerts (transaction and signature screening).
    pub security: SecurityConfig,
    /// Vault backup target.
    pub backup: BackupConfig,
    /// Third-party API keys.
    pub api_keys: ApiKeys,
    /// Keyring vault encryption cost.
    pub keyring: KeyringConfig,
    /// Quiet period after a network switch before dependents reconfigure.
    pub settle_delay: SettleDelay,
}

/// Newtype so `EngineConfig` can derive `Default` with the 500 ms delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelay(pub Duration);

impl Default for SettleDelay {
    fn default() -> Self {
        Self(DEFAULT_SETTLE_DELAY)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkSettings {
    /// Project id appended to Infura RPC urls of built-in networks.
    pub infura_project_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Start background pollers after construction.
    pub enabled: bool,
    pub token_list: Duration,
    pub token_detection: Duration,
    pub nft_detection: Duration,
    pub incoming_transactions: Duration,
    pub currency_rate: Duration,
    pub token_rates: Duration,
    pub token_balances: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_list: Duration::from_secs(4 * 60 * 60),
            token_detection: Duration::from_secs(180),
            nft_detection: Duration::from_secs(180),
            incoming_transactions: Duration::from_secs(180),
            currency_rate: CURRENCY_RATE_INTERVAL,
            token_rates: Duration::from_secs(180),
            token_balances: TOKEN_BALANCES_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwapsConfig {
    pub enabled: bool,
}

impl Default for SwapsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    /// Build the security alerts controller.
    pub alerts_enabled: bool,
    /// Key verifying the validator's data files.
    pub public_key: Option<String>,
    /// Base url of the validator's data files.
    pub cdn_base_url: Option<String>,
}

impl SecurityConfig {
    #[must_use]
    pub fn ppom_config(&self) -> PpomConfig {
        PpomConfig {
            public_key: self.public_key.clone(),
            cdn_base_url: self.cdn_base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackupConfig {
    /// File receiving the encrypted vault. `None` keeps backups in memory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub opensea: Option<String>,
    pub etherscan: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KeyringConfig {
    pub kdf: KdfParams,
}

impl EngineConfig {
    /// Defaults overridden from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Override fields from `lookup`. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = non_empty(lookup("MM_INFURA_PROJECT_ID")) {
            self.network.infura_project_id = Some(id);
        }
        if let Some(key) = non_empty(lookup("MM_OPENSEA_KEY")) {
            self.api_keys.opensea = Some(key);
        }
        if let Some(key) = non_empty(lookup("MM_ETHERSCAN_KEY")) {
            self.api_keys.etherscan = Some(key);
        }

        let alerts_flag = lookup("WALLET_SECURITY_ALERTS_ENABLED").or_else(|| lookup("MM_BLOCKAID_UI_ENABLED"));
        if let Some(flag) = alerts_flag {
            self.security.alerts_enabled = flag == "true";
        }
        if let Some(key) = non_empty(lookup("BLOCKAID_PUBLIC_KEY")) {
            self.security.public_key = Some(key);
        }
        if let Some(cdn) = non_empty(lookup("BLOCKAID_FILE_CDN")) {
            self.security.cdn_base_url = Some(cdn);
        }

        if let Some(path) = non_empty(lookup("WALLET_VAULT_BACKUP_PATH")) {
            info!(path = %path, "Vault backups go to file");
            self.backup.path = Some(PathBuf::from(path));
        }

        if let Some(ms) = lookup("WALLET_SETTLE_DELAY_MS") {
            match ms.parse::<u64>() {
                Ok(ms) => self.settle_delay = SettleDelay(Duration::from_millis(ms)),
                Err(_) => warn!(value = %ms, "WALLET_SETTLE_DELAY_MS must be milliseconds"),
            }
        }
        if let Some(flag) = lookup("WALLET_SWAPS_ENABLED") {
            self.swaps.enabled = flag != "false";
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.settle_delay.0, DEFAULT_SETTLE_DELAY);
        assert_eq!(config.polling.token_balances, Duration::from_secs(10));
        assert!(!config.security.alerts_enabled);
        assert!(config.backup.path.is_none());
    }

    #[test]
    fn test_security_flag_requires_literal_true() {
        let mut config = EngineConfig::default();
        config.apply_env(lookup(&[("MM_BLOCKAID_UI_ENABLED", "1")]));
        assert!(!config.security.alerts_enabled);

        config.apply_env(lookup(&[("MM_BLOCKAID_UI_ENABLED", "true")]));
        assert!(config.security.alerts_enabled);
    }

    #[test]
    fn test_wallet_flag_wins_over_legacy_flag() {
        let mut config = EngineConfig::default();
        config.apply_env(lookup(&[
            ("WALLET_SECURITY_ALERTS_ENABLED", "false"),
            ("MM_BLOCKAID_UI_ENABLED", "true"),
        ]));
        assert!(!config.security.alerts_enabled);
    }

    #[test]
    fn test_keys_paths_and_delay() {
        let mut config = EngineConfig::default();
        config.apply_env(lookup(&[
            ("MM_INFURA_PROJECT_ID", "abc"),
            ("MM_ETHERSCAN_KEY", ""),
            ("BLOCKAID_PUBLIC_KEY", "pk"),
            ("BLOCKAID_FILE_CDN", "cdn.example"),
            ("WALLET_VAULT_BACKUP_PATH", "/tmp/vault.json"),
            ("WALLET_SETTLE_DELAY_MS", "250"),
        ]));
        assert_eq!(config.network.infura_project_id.as_deref(), Some("abc"));
        assert!(config.api_keys.etherscan.is_none());
        assert_eq!(config.security.ppom_config().public_key.as_deref(), Some("pk"));
        assert_eq!(config.backup.path, Some(PathBuf::from("/tmp/vault.json")));
        assert_eq!(config.settle_delay.0, Duration::from_millis(250));
    }
}
