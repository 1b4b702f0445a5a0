//! Durable storage of accounts, targets, and settings.
//!
//! The engine consumes storage only through the `Store` trait; `JsonFileStore`
//! is the in-repo backend.

mod json_file;
mod traits;
mod types;

pub use json_file::{JsonFileStore, StoreDocument};
pub use traits::{Store, StoreError};
pub use types::{Account, Settings, Target, TargetMode};
