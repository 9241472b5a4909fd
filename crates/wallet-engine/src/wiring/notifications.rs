//! Incoming transaction notifications.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

use wallet_controllers::transaction::TransactionHubEvent;

use crate::adapters::NotificationSink;

/// Forward `IncomingTransactionBlock` hub events to `sink` until the hub closes.
pub fn spawn_incoming_transaction_forwarder(
    mut hub: broadcast::Receiver<TransactionHubEvent>,
    sink: Arc<dyn NotificationSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match hub.recv().await {
                Ok(TransactionHubEvent::IncomingTransactionBlock(block)) => sink.incoming_transaction_block(block),
                Ok(TransactionHubEvent::NetworkChange(_)) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Transaction hub lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingNotificationSink;
    use shared_types::ChainId;

    #[tokio::test]
    async fn test_only_incoming_blocks_are_forwarded() {
        let (tx, rx) = broadcast::channel(8);
        let sink = Arc::new(RecordingNotificationSink::default());
        let task = spawn_incoming_transaction_forwarder(rx, sink.clone());

        tx.send(TransactionHubEvent::NetworkChange(ChainId::SEPOLIA)).unwrap();
        tx.send(TransactionHubEvent::IncomingTransactionBlock(42)).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(sink.blocks(), vec![42]);
    }
}
