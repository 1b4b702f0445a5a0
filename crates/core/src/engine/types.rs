//! Types for the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::captcha::CaptchaError;
use crate::store::{StoreError, Target};

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine has been closed.
    #[error("engine is closed")]
    Closed,

    /// The operation needs a running engine.
    #[error("engine is not running")]
    NotRunning,

    /// No logged-in account to act with.
    #[error("no accounts available")]
    NoAccounts,

    /// Rejected input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Captcha error.
    #[error("{0}")]
    Captcha(#[from] CaptchaError),
}

/// Whether a target's orders need a verification token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedCaptcha {
    /// Not probed yet.
    #[default]
    Unknown,
    Required,
    NotRequired,
}

impl From<bool> for NeedCaptcha {
    fn from(required: bool) -> Self {
        if required {
            NeedCaptcha::Required
        } else {
            NeedCaptcha::NotRequired
        }
    }
}

/// Externally visible runtime status of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub target_id: String,
    pub running: bool,
    pub purchased_qty: u32,
    pub target_qty: u32,
    pub need_captcha: NeedCaptcha,
    pub last_error: Option<String>,
    pub last_attempt_ms: Option<i64>,
    pub last_success_ms: Option<i64>,
    /// Which unit instance owns this state. Writes from older units are ignored.
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl TaskState {
    /// Fresh state for a unit that is about to start. A restarted target is a
    /// new purchase job, so only `last_success_ms` is kept as history.
    pub(crate) fn starting(target: &Target, generation: u64, previous: Option<&TaskState>) -> Self {
        Self {
            target_id: target.id.clone(),
            running: true,
            purchased_qty: 0,
            target_qty: target.target_qty,
            need_captcha: NeedCaptcha::Unknown,
            last_error: None,
            last_attempt_ms: None,
            last_success_ms: previous.and_then(|p| p.last_success_ms),
            generation,
        }
    }

    /// State for a target that was refused before any unit was spawned.
    pub(crate) fn rejected(
        target: &Target,
        generation: u64,
        reason: String,
        previous: Option<&TaskState>,
    ) -> Self {
        Self {
            running: false,
            last_error: Some(reason),
            ..Self::starting(target, generation, previous)
        }
    }

    pub fn quota_met(&self) -> bool {
        self.purchased_qty >= self.target_qty
    }

    pub fn remaining_qty(&self) -> u32 {
        self.target_qty.saturating_sub(self.purchased_qty)
    }
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Targets that got a unit for the first time.
    pub started: Vec<String>,
    /// Targets whose unit was cancelled because they are no longer enabled.
    pub stopped: Vec<String>,
    /// Targets whose unit was replaced because their `updated_at` changed.
    pub restarted: Vec<String>,
    /// Enabled targets refused because their fields are invalid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.restarted.is_empty()
            && self.rejected.is_empty()
    }
}

/// Action taken by `auto_run_by_store`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AutoRunAction {
    /// Nothing enabled and nothing running.
    Idle,
    /// Engine was started.
    Started,
    /// Nothing enabled; engine was stopped.
    Stopped,
    /// Engine already running; units reconciled.
    Synced(SyncReport),
}
