//! Storage trait for accounts, targets, and settings.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{Account, Settings, Target};

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing storage could not be read or written.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Stored data could not be decoded.
    #[error("storage data is malformed: {0}")]
    Malformed(String),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Durable source of accounts, targets, and settings.
#[async_trait]
pub trait Store: Send + Sync {
    /// Targets with `enabled = true`.
    async fn list_enabled_targets(&self) -> Result<Vec<Target>, StoreError>;

    /// All known accounts, logged in or not.
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Replace an account's stored snapshot (matched by id).
    async fn save_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Current settings; defaults when none have been saved.
    async fn get_settings(&self) -> Result<Settings, StoreError>;

    /// Persist settings.
    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}
