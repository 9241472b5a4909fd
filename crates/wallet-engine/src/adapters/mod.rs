//! # Engine Adapters
//!
//! Outbound ports owned by the engine itself (vault backup, notifications)
//! and the bundle of services the controllers are built with.

pub mod backup_store;
pub mod notifications;
pub mod services;

pub use backup_store::{FileVaultBackup, InMemoryVaultBackup, VaultBackupStore};
pub use notifications::{LogNotificationSink, NotificationSink, RecordingNotificationSink};
pub use services::EngineServices;
