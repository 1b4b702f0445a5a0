//! Types for the captcha pool.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::settings::CaptchaPoolSettings;
use super::traits::{SolveError, SolveMetrics};

/// Errors raised while obtaining or storing verification tokens.
#[derive(Debug, Error)]
pub enum CaptchaError {
    /// A token submission was blank.
    #[error("verify param is empty")]
    EmptyVerifyParam,

    /// The solver reported success without a token.
    #[error(
        "solver returned an empty verify param (attempts={}, duration={}ms)",
        .0.attempts,
        .0.duration_ms
    )]
    EmptyResult(SolveMetrics),

    /// The solver failed.
    #[error("captcha solve failed: {0}")]
    Solve(#[from] SolveError),

    /// The solve did not finish in time.
    #[error("captcha solve timed out after {0}ms")]
    Timeout(u64),
}

/// A pre-solved token waiting in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaPoolItem {
    pub verify_param: String,
    pub solved_at_ms: i64,
}

impl CaptchaPoolItem {
    pub fn expires_at_ms(&self, ttl_ms: i64) -> i64 {
        self.solved_at_ms.saturating_add(ttl_ms)
    }

    pub fn is_expired(&self, ttl_ms: i64, now_ms: i64) -> bool {
        self.expires_at_ms(ttl_ms) <= now_ms
    }
}

/// Read-only view of a pooled token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaPoolItemView {
    pub verify_param: String,
    pub solved_at_ms: i64,
    pub expires_at_ms: i64,
    pub remaining_ms: i64,
}

/// Pool state for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaPoolStatus {
    pub settings: CaptchaPoolSettings,
    pub size: usize,
    pub desired: usize,
    pub activated: bool,
    pub activate_at_ms: Option<i64>,
    pub items: Vec<CaptchaPoolItemView>,
}

/// Who asked for a fill. Only affects logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Periodic top-up by the maintainer.
    Maintenance,
    /// Operator-triggered.
    Manual,
}

/// Aggregate result of a bounded fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub requested: usize,
    pub added: usize,
    pub failed: usize,
}
