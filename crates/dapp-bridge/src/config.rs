//! # Bridge Configuration
//!
//! Defaults with environment overrides, in the same shape as the engine's
//! configuration.

use std::time::Duration;

use tracing::warn;

use crate::walletconnect::PeerMetadata;

/// Time given to the engine before the protocol client is built.
pub const DEFAULT_WARMUP_DELAY: Duration = Duration::from_millis(3_000);
pub const DEFAULT_UNLOCK_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_UNLOCK_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_DEEPLINK_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_DEEPLINK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// WalletConnect cloud project id.
    pub project_id: Option<String>,
    /// How the wallet presents itself to peers.
    pub metadata: PeerMetadata,
    pub warmup_delay: Duration,
    /// Keyring unlock polling for inbound session requests.
    pub unlock_poll_interval: Duration,
    pub unlock_timeout: Duration,
    /// Bridge readiness polling for deep links.
    pub deeplink_poll_interval: Duration,
    pub deeplink_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            metadata: PeerMetadata {
                name: "MetaMask Wallet".into(),
                description: "MetaMask Wallet Integration".into(),
                url: "https://metamask.io/".into(),
                icons: Vec::new(),
            },
            warmup_delay: DEFAULT_WARMUP_DELAY,
            unlock_poll_interval: DEFAULT_UNLOCK_POLL_INTERVAL,
            unlock_timeout: DEFAULT_UNLOCK_TIMEOUT,
            deeplink_poll_interval: DEFAULT_DEEPLINK_POLL_INTERVAL,
            deeplink_timeout: DEFAULT_DEEPLINK_TIMEOUT,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Override fields from `lookup`. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("WALLET_CONNECT_PROJECT_ID").filter(|v| !v.trim().is_empty()) {
            self.project_id = Some(id);
        }
        if let Some(delay) = millis(&lookup, "WALLET_CONNECT_WARMUP_MS") {
            self.warmup_delay = delay;
        }
        if let Some(timeout) = millis(&lookup, "WALLET_CONNECT_UNLOCK_TIMEOUT_MS") {
            self.unlock_timeout = timeout;
        }
        if let Some(timeout) = millis(&lookup, "WALLET_DEEPLINK_TIMEOUT_MS") {
            self.deeplink_timeout = timeout;
        }
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!(key, value = %raw, "Expected milliseconds");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.warmup_delay, Duration::from_millis(3_000));
        assert_eq!(config.deeplink_poll_interval, Duration::from_millis(500));
        assert!(config.project_id.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WALLET_CONNECT_PROJECT_ID", "abc123"),
            ("WALLET_CONNECT_WARMUP_MS", "10"),
            ("WALLET_DEEPLINK_TIMEOUT_MS", "soon"),
        ]);
        let mut config = BridgeConfig::default();

        config.apply_env(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.project_id.as_deref(), Some("abc123"));
        assert_eq!(config.warmup_delay, Duration::from_millis(10));
        assert_eq!(config.deeplink_timeout, DEFAULT_DEEPLINK_TIMEOUT);
    }
}
