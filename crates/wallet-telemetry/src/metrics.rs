//! Prometheus metrics for the wallet engine.
//!
//! All metrics follow the naming convention: `wallet_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // ENGINE
    // =========================================================================

    /// Events published on the controller bus
    pub static ref BUS_EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("wallet_bus_events_published_total", "Events published on the message bus"),
        &["namespace"]
    ).expect("metric creation failed");

    /// Approvals requested, by approval type
    pub static ref APPROVALS_REQUESTED: CounterVec = CounterVec::new(
        Opts::new("wallet_approvals_requested_total", "Approval requests added"),
        &["type"]
    ).expect("metric creation failed");

    /// Approvals resolved, by outcome
    pub static ref APPROVALS_RESOLVED: CounterVec = CounterVec::new(
        Opts::new("wallet_approvals_resolved_total", "Approval requests resolved"),
        &["outcome"]  // accepted / rejected / failed
    ).expect("metric creation failed");

    /// Dependent-controller reconfiguration passes
    pub static ref NETWORK_RECONFIGURATIONS: IntCounter = IntCounter::new(
        "wallet_network_reconfigurations_total",
        "Reconfiguration passes after a settled chain change"
    ).expect("metric creation failed");

    /// Vault backups attempted, by outcome
    pub static ref VAULT_BACKUPS: CounterVec = CounterVec::new(
        Opts::new("wallet_vault_backups_total", "Vault backup attempts"),
        &["outcome"]  // success / failure
    ).expect("metric creation failed");

    // =========================================================================
    // DAPP BRIDGE
    // =========================================================================

    /// Active WalletConnect sessions
    pub static ref WALLETCONNECT_SESSIONS: Gauge = Gauge::new(
        "wallet_walletconnect_sessions_active",
        "Active WalletConnect v2 sessions"
    ).expect("metric creation failed");

    /// WalletConnect requests handled, by result
    pub static ref WALLETCONNECT_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("wallet_walletconnect_requests_total", "Session requests handled"),
        &["result"]  // approved / rejected
    ).expect("metric creation failed");

    /// Deep links routed, by action
    pub static ref DEEPLINKS_HANDLED: CounterVec = CounterVec::new(
        Opts::new("wallet_deeplinks_handled_total", "SDK deep links routed"),
        &["action"]  // reconnect / connect / timeout
    ).expect("metric creation failed");
}

/// Handle to the populated registry.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BUS_EVENTS_PUBLISHED.clone()),
        Box::new(APPROVALS_REQUESTED.clone()),
        Box::new(APPROVALS_RESOLVED.clone()),
        Box::new(NETWORK_RECONFIGURATIONS.clone()),
        Box::new(VAULT_BACKUPS.clone()),
        Box::new(WALLETCONNECT_SESSIONS.clone()),
        Box::new(WALLETCONNECT_REQUESTS.clone()),
        Box::new(DEEPLINKS_HANDLED.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increment() {
        NETWORK_RECONFIGURATIONS.inc();
        assert!(NETWORK_RECONFIGURATIONS.get() >= 1);
    }

    #[test]
    fn test_gauge_set() {
        WALLETCONNECT_SESSIONS.set(3.0);
        assert_eq!(WALLETCONNECT_SESSIONS.get(), 3.0);
    }

    #[test]
    fn test_encode_after_register() {
        // Registration may already have happened in another test.
        let _ = register_metrics();
        VAULT_BACKUPS.with_label_values(&["success"]).inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("wallet_vault_backups_total"));
    }
}
