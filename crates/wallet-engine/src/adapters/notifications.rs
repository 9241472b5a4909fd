//! User-facing notifications raised by the engine.

use parking_lot::Mutex;
use tracing::info;

/// Receives notifications the UI layer turns into banners or pushes.
pub trait NotificationSink: Send + Sync {
    /// Incoming transactions were found up to `block_number`.
    fn incoming_transaction_block(&self, block_number: u64);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn incoming_transaction_block(&self, block_number: u64) {
        info!(block_number, "Incoming transaction received");
    }
}

/// Records notifications for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    blocks: Mutex<Vec<u64>>,
}

impl RecordingNotificationSink {
    #[must_use]
    pub fn blocks(&self) -> Vec<u64> {
        self.blocks.lock().clone()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn incoming_transaction_block(&self, block_number: u64) {
        self.blocks.lock().push(block_number);
    }
}
