use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::captcha::CaptchaConfig;
use crate::engine::EngineConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub log_bus: LogBusConfig,
}

/// Session gateway that owns the upstream protocol.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Gateway base URL (e.g., "http://127.0.0.1:7700")
    #[serde(default = "default_provider_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 15)
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

fn default_provider_url() -> String {
    "http://127.0.0.1:7700".to_string()
}

fn default_provider_timeout() -> u64 {
    15
}

/// Captcha solver sidecar.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverConfig {
    #[serde(default = "default_solver_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_solver_timeout")]
    pub timeout_secs: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_solver_url(),
            timeout_secs: default_solver_timeout(),
        }
    }
}

fn default_solver_url() -> String {
    "http://127.0.0.1:7701".to_string()
}

fn default_solver_timeout() -> u64 {
    30
}

/// Store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("sniper.json")
}

/// Order notification delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    /// Webhook receiving order-created events. Events are only logged when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            queue_size: default_queue_size(),
        }
    }
}

fn default_queue_size() -> usize {
    256
}

/// Log bus sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogBusConfig {
    /// Entries retained for late subscribers.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
    /// Per-subscriber channel size; a full subscriber misses messages.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for LogBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_bus_capacity(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

fn default_bus_capacity() -> usize {
    500
}

fn default_subscriber_buffer() -> usize {
    64
}

/// Sanitized config for logging (webhook URL redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub engine: EngineConfig,
    pub captcha: CaptchaConfig,
    pub provider: ProviderConfig,
    pub solver: SolverConfig,
    pub store: StoreConfig,
    pub webhook_configured: bool,
    pub notifier_queue_size: usize,
    pub log_bus: LogBusConfig,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            engine: config.engine.clone(),
            captcha: config.captcha.clone(),
            provider: config.provider.clone(),
            solver: config.solver.clone(),
            store: config.store.clone(),
            webhook_configured: config
                .notifier
                .webhook_url
                .as_deref()
                .is_some_and(|u| !u.trim().is_empty()),
            notifier_queue_size: config.notifier.queue_size,
            log_bus: config.log_bus.clone(),
        }
    }
}
