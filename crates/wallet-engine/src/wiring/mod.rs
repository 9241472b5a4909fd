//! # Engine Wiring
//!
//! Side effects connecting controllers after construction. Everything here
//! is owned by [`EngineTasks`] and torn down with the engine.
//!
//! | Trigger | Effect | Module |
//! |---------|--------|--------|
//! | `NetworkController:networkDidChange` | settled reconfiguration of dependents | `network_change` |
//! | `KeyringController:stateChange` | vault backup | `backup` |
//! | transaction hub `IncomingTransactionBlock` | user notification | `notifications` |
//! | timers | token list, detection, rates, balances, incoming transactions | `polling` |

pub mod backup;
pub mod network_change;
pub mod notifications;
pub mod polling;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use shared_bus::SubscriptionId;
use wallet_controllers::{ControllerBus, Poller, TransactionSigner};

use crate::adapters::EngineServices;
use crate::container::{EngineConfig, EngineContext};

/// Background work and bus subscriptions owned by a live engine.
#[derive(Default)]
pub struct EngineTasks {
    subscriptions: Vec<SubscriptionId>,
    handles: Vec<JoinHandle<()>>,
    pollers: Vec<Poller>,
}

impl EngineTasks {
    /// Wire every side effect.
    pub fn wire(bus: &ControllerBus, context: &EngineContext, config: &EngineConfig, services: &EngineServices) -> Self {
        let mut tasks = Self::default();

        let signer: Arc<dyn TransactionSigner> = context.keyring.clone();
        context.transaction.set_signer(signer);

        tasks.handles.push(notifications::spawn_incoming_transaction_forwarder(
            context.transaction.subscribe_hub(),
            Arc::clone(&services.notifications),
        ));

        let (chain_tx, chain_rx) = mpsc::unbounded_channel();
        tasks
            .subscriptions
            .push(network_change::subscribe_network_changes(bus, chain_tx));
        let reconfigure_context = context.clone();
        let swaps_enabled = config.swaps.enabled;
        tasks.handles.push(network_change::spawn_settle_loop(
            chain_rx,
            config.settle_delay.0,
            context.network.current_chain_id(),
            move |chain| {
                let context = reconfigure_context.clone();
                async move { network_change::reconfigure(&context, chain, swaps_enabled).await }
            },
        ));

        let (vault_tx, vault_rx) = mpsc::unbounded_channel();
        tasks.subscriptions.push(backup::subscribe_vault_changes(bus, vault_tx));
        tasks.handles.push(backup::spawn_backup_writer(
            vault_rx,
            Arc::clone(&services.vault_backup),
        ));

        if config.polling.enabled {
            tasks.pollers = polling::start_pollers(context, &config.polling);
            info!(pollers = tasks.pollers.len(), "Background polling started");
        } else {
            debug!("Background polling disabled");
        }
        tasks
    }

    /// Stop pollers, abort tasks and drop the subscriptions.
    pub fn shutdown(&mut self, bus: &ControllerBus) {
        for poller in self.pollers.drain(..) {
            poller.stop();
        }
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        for id in self.subscriptions.drain(..) {
            bus.unsubscribe(id);
        }
    }
}

impl std::fmt::Debug for EngineTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineTasks")
            .field("subscriptions", &self.subscriptions.len())
            .field("handles", &self.handles.len())
            .field("pollers", &self.pollers.len())
            .finish()
    }
}
