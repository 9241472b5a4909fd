//! Vault backup targets.

use crate::errors::{EngineError, EngineResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::debug;

/// Receives the encrypted keyring vault whenever it changes.
#[async_trait]
pub trait VaultBackupStore: Send + Sync {
    async fn store(&self, vault: &str) -> EngineResult<()>;

    async fn load(&self) -> EngineResult<Option<String>>;
}

/// Keeps the latest vault in memory.
#[derive(Debug, Default)]
pub struct InMemoryVaultBackup {
    vault: RwLock<Option<String>>,
}

#[async_trait]
impl VaultBackupStore for InMemoryVaultBackup {
    async fn store(&self, vault: &str) -> EngineResult<()> {
        *self.vault.write() = Some(vault.to_string());
        Ok(())
    }

    async fn load(&self) -> EngineResult<Option<String>> {
        Ok(self.vault.read().clone())
    }
}

/// Writes the vault to one file, replacing it atomically.
#[derive(Debug, Clone)]
pub struct FileVaultBackup {
    path: PathBuf,
}

impl FileVaultBackup {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl VaultBackupStore for FileVaultBackup {
    async fn store(&self, vault: &str) -> EngineResult<()> {
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, vault.as_bytes())
            .await
            .map_err(|e| EngineError::Backup(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| EngineError::Backup(format!("rename to {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), bytes = vault.len(), "Vault backed up");
        Ok(())
    }

    async fn load(&self) -> EngineResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(vault) => Ok(Some(vault)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Backup(format!("read {}: {e}", self.path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_backup_replaces_previous_vault() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVaultBackup::new(dir.path().join("vault.json"));
        assert_eq!(store.load().await.unwrap(), None);

        store.store("first").await.unwrap();
        store.store("second").await.unwrap();

        assert_eq!(store.load().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVaultBackup::new(dir.path().join("missing").join("vault.json"));
        assert!(matches!(store.store("v").await, Err(EngineError::Backup(_))));
    }
}
