//! Single-document JSON store.
//!
//! The whole document is re-read on every call, so edits made to the file by
//! an operator are visible to the next reconciliation without a restart.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::{Store, StoreError};
use super::types::{Account, Settings, Target};

/// On-disk layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub settings: Settings,
}

/// JSON-file backed `Store`.
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles from this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document. A missing file is an empty document.
    pub async fn load(&self) -> Result<StoreDocument, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreDocument::default()),
            Err(e) => return Err(StoreError::Io(format!("{}: {}", self.path.display(), e))),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(StoreDocument::default());
        }
        serde_json::from_slice(&raw)
            .map_err(|e| StoreError::Malformed(format!("{}: {}", self.path.display(), e)))
    }

    /// Write the document via a temp file and rename.
    pub async fn write(&self, doc: &StoreDocument) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(doc)
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), "Store document written");
        Ok(())
    }

    async fn modify<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StoreDocument) -> Result<(), StoreError>,
    {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        f(&mut doc)?;
        self.write(&doc).await
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn list_enabled_targets(&self) -> Result<Vec<Target>, StoreError> {
        let doc = self.load().await?;
        Ok(doc.targets.into_iter().filter(|t| t.enabled).collect())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.load().await?.accounts)
    }

    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        self.modify(|doc| {
            let slot = doc
                .accounts
                .iter_mut()
                .find(|a| a.id == account.id)
                .ok_or_else(|| StoreError::NotFound(format!("account {}", account.id)))?;
            *slot = account.clone();
            Ok(())
        })
        .await
    }

    async fn get_settings(&self) -> Result<Settings, StoreError> {
        Ok(self.load().await?.settings)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.modify(|doc| {
            doc.settings = settings.clone();
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("state.json"))
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(store.list_enabled_targets().await.unwrap().is_empty());
        assert!(store.list_accounts().await.unwrap().is_empty());
        assert_eq!(store.get_settings().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_lists_only_enabled_targets() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut disabled = fixtures::scan_target("t2");
        disabled.enabled = false;
        let doc = StoreDocument {
            accounts: vec![fixtures::account("a1")],
            targets: vec![fixtures::scan_target("t1"), disabled],
            settings: Settings::default(),
        };
        store.write(&doc).await.unwrap();

        let targets = store.list_enabled_targets().await.unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, "t1");
    }

    #[tokio::test]
    async fn test_save_account_replaces_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store
            .write(&StoreDocument {
                accounts: vec![fixtures::account("a1")],
                ..Default::default()
            })
            .await
            .unwrap();

        let mut updated = fixtures::account("a1");
        updated.cookies = Some("jar-v2".to_string());
        store.save_account(&updated).await.unwrap();

        let accounts = store.list_accounts().await.unwrap();
        assert_eq!(accounts[0].cookies.as_deref(), Some("jar-v2"));
    }

    #[tokio::test]
    async fn test_save_unknown_account_fails() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let result = store.save_account(&fixtures::account("ghost")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_settings_roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut settings = Settings::default();
        settings.max_concurrent_solvers = 6;
        settings.captcha_pool.pool_size = 4;
        store.save_settings(&settings).await.unwrap();

        let reopened = store_in(&dir);
        assert_eq!(reopened.get_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_malformed_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        tokio::fs::write(store.path(), b"{not json").await.unwrap();

        let result = store.list_accounts().await;
        assert!(matches!(result, Err(StoreError::Malformed(_))));
    }
}
