//! # Wallet Telemetry
//!
//! Logging and metrics for the wallet engine and the dapp bridge.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by a `tracing-subscriber` fmt or
//!   JSON layer behind an `EnvFilter`
//! - **Metrics**: Prometheus counters and gauges in a process registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wallet_telemetry::{TelemetryConfig, init_telemetry};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `wallet-engine` | Service name in log records |
//! | `WALLET_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `WALLET_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `WALLET_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, APPROVALS_REQUESTED, APPROVALS_RESOLVED,
    BUS_EVENTS_PUBLISHED, DEEPLINKS_HANDLED, NETWORK_RECONFIGURATIONS, VAULT_BACKUPS,
    WALLETCONNECT_REQUESTS, WALLETCONNECT_SESSIONS,
};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Initialize metrics first
    let metrics_handle = register_metrics()?;

    let tracing_guard = init_tracing(&config)?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "wallet-engine");
    }

    #[test]
    fn test_metric_inc_macro() {
        let before = APPROVALS_REQUESTED.with_label_values(&["test"]).get();
        metric_inc!(APPROVALS_REQUESTED, &["test"]);
        assert!(APPROVALS_REQUESTED.with_label_values(&["test"]).get() > before);
    }
}
