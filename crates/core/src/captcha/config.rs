//! Captcha pool timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing knobs for the pool maintainer and token acquisition.
///
/// Pool sizing (`warmup_seconds`, `pool_size`, `item_ttl_seconds`) is an
/// operator setting persisted in the Store, not part of this file config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    /// Maintainer tick interval (milliseconds).
    #[serde(default = "default_pool_tick")]
    pub pool_tick_ms: u64,

    /// Upper bound for one maintenance fill, so a stuck solver cannot
    /// starve later ticks (milliseconds).
    #[serde(default = "default_fill_deadline")]
    pub fill_deadline_ms: u64,

    /// How long an order attempt waits on the pool before solving directly
    /// (milliseconds).
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    /// Timeout for a single solve call (milliseconds).
    #[serde(default = "default_solve_timeout")]
    pub solve_timeout_ms: u64,
}

fn default_pool_tick() -> u64 {
    800
}

fn default_fill_deadline() -> u64 {
    25_000
}

fn default_acquire_timeout() -> u64 {
    2000
}

fn default_solve_timeout() -> u64 {
    20_000
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            pool_tick_ms: default_pool_tick(),
            fill_deadline_ms: default_fill_deadline(),
            acquire_timeout_ms: default_acquire_timeout(),
            solve_timeout_ms: default_solve_timeout(),
        }
    }
}

impl CaptchaConfig {
    pub fn pool_tick(&self) -> Duration {
        Duration::from_millis(self.pool_tick_ms)
    }

    pub fn fill_deadline(&self) -> Duration {
        Duration::from_millis(self.fill_deadline_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn solve_timeout(&self) -> Duration {
        Duration::from_millis(self.solve_timeout_ms)
    }
}
