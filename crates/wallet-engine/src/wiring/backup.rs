//! Best-effort vault backup on every keyring change.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use shared_bus::SubscriptionId;
use wallet_controllers::messaging::events;
use wallet_controllers::{ControllerBus, ControllerEvent, StateSlice};

use crate::adapters::VaultBackupStore;

/// Queue each new vault ciphertext for backup.
///
/// Republished states carrying an unchanged vault are not queued again.
pub fn subscribe_vault_changes(bus: &ControllerBus, tx: mpsc::UnboundedSender<String>) -> SubscriptionId {
    let last = Mutex::new(None::<String>);
    bus.subscribe(
        events::KEYRING_STATE_CHANGE,
        Arc::new(move |event: &ControllerEvent| {
            let ControllerEvent::StateChange(slice) = event else {
                return;
            };
            let StateSlice::Keyring(state) = slice.as_ref() else {
                return;
            };
            let Some(vault) = &state.vault else {
                return;
            };
            let mut last = last.lock();
            if last.as_deref() == Some(vault.as_str()) {
                return;
            }
            *last = Some(vault.clone());
            if tx.send(vault.clone()).is_err() {
                debug!("Vault backup writer closed");
            }
        }),
    )
}

/// Write queued vaults to `store`. Failures are logged and counted, not retried.
pub fn spawn_backup_writer(mut rx: mpsc::UnboundedReceiver<String>, store: Arc<dyn VaultBackupStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(vault) = rx.recv().await {
            match store.store(&vault).await {
                Ok(()) => {
                    wallet_telemetry::metric_inc!(wallet_telemetry::VAULT_BACKUPS, &["success"]);
                }
                Err(e) => {
                    error!(error = %e, "Vault backup failed");
                    wallet_telemetry::metric_inc!(wallet_telemetry::VAULT_BACKUPS, &["failure"]);
                }
            }
        }
    })
}
