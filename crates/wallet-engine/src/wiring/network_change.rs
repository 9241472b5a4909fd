//! # Network Change Reconfiguration
//!
//! `NetworkController:networkDidChange` fires on every switch. Dependents are
//! reconfigured once the selection has been quiet for the settle delay, and
//! only when the settled chain differs from the last one they were
//! configured for.
//!
//! ```text
//! networkDidChange ──▶ mpsc ──▶ settle loop ──▶ reconfigure(chain)
//!   (sync handler)             (last value wins)   account tracker
//!                                                   assets contract
//!                                                   swaps
//!                                                   transaction hub
//!                                                   token detection
//!                                                   nft detection
//!                                                   balance refresh
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shared_bus::SubscriptionId;
use shared_types::ChainId;
use wallet_controllers::messaging::events;
use wallet_controllers::{ControllerBus, ControllerEvent};

use crate::container::EngineContext;

/// Forward every `networkDidChange` chain id into `tx`.
pub fn subscribe_network_changes(bus: &ControllerBus, tx: mpsc::UnboundedSender<ChainId>) -> SubscriptionId {
    bus.subscribe(
        events::NETWORK_DID_CHANGE,
        Arc::new(move |event: &ControllerEvent| {
            if let ControllerEvent::NetworkDidChange(config) = event {
                if tx.send(config.chain_id).is_err() {
                    debug!("Network change listener closed");
                }
            }
        }),
    )
}

/// Collapse bursts of chain ids into single settled values.
///
/// `on_settled` runs at most once per burst, with the burst's last chain id,
/// and never for the chain it last ran with.
pub fn spawn_settle_loop<F, Fut>(
    mut rx: mpsc::UnboundedReceiver<ChainId>,
    settle: Duration,
    initial_chain: ChainId,
    on_settled: F,
) -> JoinHandle<()>
where
    F: Fn(ChainId) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut last_configured = initial_chain;
        while let Some(first) = rx.recv().await {
            let mut chain = first;
            let mut closed = false;
            loop {
                match tokio::time::timeout(settle, rx.recv()).await {
                    Ok(Some(next)) => chain = next,
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }
            if closed {
                break;
            }
            if chain == last_configured {
                debug!(chain = %chain, "Network settled on the configured chain, skipping");
                continue;
            }
            last_configured = chain;
            on_settled(chain).await;
        }
    })
}

/// Point every chain-dependent controller at `chain_id`.
pub async fn reconfigure(context: &EngineContext, chain_id: ChainId, swaps_enabled: bool) {
    info!(chain = %chain_id, "Reconfiguring for network change");

    context.account_tracker.configure(chain_id);
    context.assets_contract.configure(chain_id);
    if swaps_enabled {
        context.swaps.configure(chain_id);
    }
    context.transaction.notify_network_change(chain_id);

    context.token_list.on_network_change();
    context.tokens.on_network_or_account_change();
    context.token_detection.restart().await;

    if let Err(e) = context.nft_detection.detect_nfts().await {
        warn!(error = %e, "NFT detection after network change failed");
    }
    if let Err(e) = context.account_tracker.refresh().await {
        warn!(error = %e, "Balance refresh after network change failed");
    }

    wallet_telemetry::metric_inc!(wallet_telemetry::NETWORK_RECONFIGURATIONS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<ChainId>>>, impl Fn(ChainId) -> std::future::Ready<()> + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |chain| {
            sink.lock().push(chain);
            std::future::ready(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_chain() {
        // Arrange
        let (tx, rx) = mpsc::unbounded_channel();
        let (seen, on_settled) = recorder();
        let _loop = spawn_settle_loop(rx, Duration::from_millis(500), ChainId::MAINNET, on_settled);

        // Act
        tx.send(ChainId::SEPOLIA).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(ChainId::GOERLI).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(ChainId::LINEA_MAINNET).unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        // Assert
        assert_eq!(*seen.lock(), vec![ChainId::LINEA_MAINNET]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_each_reconfigure() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (seen, on_settled) = recorder();
        let _loop = spawn_settle_loop(rx, Duration::from_millis(500), ChainId::MAINNET, on_settled);

        tx.send(ChainId::SEPOLIA).unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;
        tx.send(ChainId::GOERLI).unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert_eq!(*seen.lock(), vec![ChainId::SEPOLIA, ChainId::GOERLI]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settling_on_current_chain_is_skipped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (seen, on_settled) = recorder();
        let _loop = spawn_settle_loop(rx, Duration::from_millis(500), ChainId::MAINNET, on_settled);

        tx.send(ChainId::SEPOLIA).unwrap();
        tx.send(ChainId::MAINNET).unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert!(seen.lock().is_empty());
    }
}
