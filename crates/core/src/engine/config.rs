//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing for execution units and the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between attempts of a scan-mode target (milliseconds).
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,

    /// Delay between back-to-back attempts once a rush deadline has passed
    /// (milliseconds).
    #[serde(default = "default_rush_retry_interval")]
    pub rush_retry_interval_ms: u64,

    /// How long after its deadline a rush target keeps trying (seconds).
    #[serde(default = "default_rush_window")]
    pub rush_window_secs: u64,

    /// Upper bound on how long `stop_all` waits for units to exit
    /// (milliseconds).
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,

    /// How long a restarted unit waits for its predecessor to exit before
    /// aborting it (milliseconds).
    #[serde(default = "default_restart_drain_timeout")]
    pub restart_drain_timeout_ms: u64,

    /// How often the daemon reconciles against the Store (milliseconds).
    #[serde(default = "default_auto_run_interval")]
    pub auto_run_interval_ms: u64,
}

fn default_scan_interval() -> u64 {
    2000
}

fn default_rush_retry_interval() -> u64 {
    300
}

fn default_rush_window() -> u64 {
    120
}

fn default_stop_timeout() -> u64 {
    5000
}

fn default_restart_drain_timeout() -> u64 {
    3000
}

fn default_auto_run_interval() -> u64 {
    3000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval(),
            rush_retry_interval_ms: default_rush_retry_interval(),
            rush_window_secs: default_rush_window(),
            stop_timeout_ms: default_stop_timeout(),
            restart_drain_timeout_ms: default_restart_drain_timeout(),
            auto_run_interval_ms: default_auto_run_interval(),
        }
    }
}

impl EngineConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn rush_retry_interval(&self) -> Duration {
        Duration::from_millis(self.rush_retry_interval_ms)
    }

    pub fn rush_window_ms(&self) -> i64 {
        i64::try_from(self.rush_window_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn restart_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_drain_timeout_ms)
    }

    pub fn auto_run_interval(&self) -> Duration {
        Duration::from_millis(self.auto_run_interval_ms)
    }
}
