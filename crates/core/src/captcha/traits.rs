//! Trait definitions for the captcha module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnostics reported with every solve, successful or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveMetrics {
    pub attempts: u32,
    pub duration_ms: u64,
}

/// A solved verification token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOutcome {
    pub verify_param: String,
    pub metrics: SolveMetrics,
}

/// A failed solve, with the attempt count and time spent.
#[derive(Debug, Clone, Error)]
#[error("{message} (attempts={}, duration={}ms)", .metrics.attempts, .metrics.duration_ms)]
pub struct SolveError {
    pub message: String,
    pub metrics: SolveMetrics,
}

impl SolveError {
    pub fn new(message: impl Into<String>, metrics: SolveMetrics) -> Self {
        Self {
            message: message.into(),
            metrics,
        }
    }
}

/// Produces verification tokens for order creation.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Returns the name of this solver implementation.
    fn name(&self) -> &str;

    /// Solve one challenge for the session identified by `session_token`.
    async fn solve(&self, timestamp_ms: i64, session_token: &str)
        -> Result<SolveOutcome, SolveError>;
}
