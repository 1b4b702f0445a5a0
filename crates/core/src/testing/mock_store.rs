//! Mock store for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::store::{Account, Settings, Store, StoreError, Target};

/// In-memory implementation of the Store trait.
///
/// Targets are returned by `list_enabled_targets` only while `enabled`, so
/// tests toggle a target with `upsert_target`.
#[derive(Debug, Default)]
pub struct MockStore {
    targets: Arc<RwLock<Vec<Target>>>,
    accounts: Arc<RwLock<Vec<Account>>>,
    settings: Arc<RwLock<Settings>>,
    /// Accounts persisted through `save_account`, in call order.
    saved_accounts: Arc<RwLock<Vec<Account>>>,
    /// If set, every list call fails with this message.
    list_error: Arc<RwLock<Option<String>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_targets(&self, targets: Vec<Target>) {
        *self.targets.write().await = targets;
    }

    /// Insert or replace a target by id.
    pub async fn upsert_target(&self, target: Target) {
        let mut targets = self.targets.write().await;
        match targets.iter_mut().find(|t| t.id == target.id) {
            Some(existing) => *existing = target,
            None => targets.push(target),
        }
    }

    pub async fn set_accounts(&self, accounts: Vec<Account>) {
        *self.accounts.write().await = accounts;
    }

    pub async fn set_settings(&self, settings: Settings) {
        *self.settings.write().await = settings;
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn saved_accounts(&self) -> Vec<Account> {
        self.saved_accounts.read().await.clone()
    }

    pub async fn set_list_error(&self, error: Option<String>) {
        *self.list_error.write().await = error;
    }

    async fn check_list_error(&self) -> Result<(), StoreError> {
        match self.list_error.read().await.as_ref() {
            Some(message) => Err(StoreError::Io(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Store for MockStore {
    async fn list_enabled_targets(&self) -> Result<Vec<Target>, StoreError> {
        self.check_list_error().await?;
        Ok(self
            .targets
            .read()
            .await
            .iter()
            .filter(|t| t.enabled)
            .cloned()
            .collect())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.check_list_error().await?;
        Ok(self.accounts.read().await.clone())
    }

    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        self.saved_accounts.write().await.push(account.clone());
        let mut accounts = self.accounts.write().await;
        match accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => {
                *existing = account.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("account {}", account.id))),
        }
    }

    async fn get_settings(&self) -> Result<Settings, StoreError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        *self.settings.write().await = settings.clone();
        Ok(())
    }
}
