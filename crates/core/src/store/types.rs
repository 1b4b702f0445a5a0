//! Accounts, targets, and persisted engine settings.

use serde::{Deserialize, Serialize};

use crate::captcha::CaptchaPoolSettings;

/// A shopper identity plus the session material the Provider needs.
///
/// The engine only ever holds read-only snapshots; the Provider hands back an
/// updated copy when a call changes session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub mobile: String,
    /// Upstream auth token. Empty means the account is not logged in.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub user_agent: String,
    /// Proxy address used by the transport layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Exported cookie-jar snapshot (opaque to the engine).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
}

impl Account {
    pub fn is_logged_in(&self) -> bool {
        !self.token.trim().is_empty()
    }

    /// Mobile number with the middle digits hidden, for logs and events.
    pub fn masked_mobile(&self) -> String {
        let chars: Vec<char> = self.mobile.chars().collect();
        if chars.len() < 7 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..3].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}****{}", head, tail)
    }
}

/// How a target's execution unit schedules its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// Wait for `rush_at_ms`, then attempt back-to-back.
    Rush,
    /// Attempt on a fixed interval until the quota is met.
    Scan,
}

impl TargetMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetMode::Rush => "rush",
            TargetMode::Scan => "scan",
        }
    }
}

/// One purchase objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub item_id: String,
    pub sku_id: String,
    pub shop_id: String,
    pub mode: TargetMode,
    /// Absolute epoch-millisecond deadline. Only meaningful in rush mode.
    #[serde(default)]
    pub rush_at_ms: i64,
    #[serde(default = "default_qty")]
    pub per_order_qty: u32,
    /// Cumulative quantity to purchase before the unit stops.
    #[serde(default = "default_qty")]
    pub target_qty: u32,
    #[serde(default)]
    pub enabled: bool,
    /// Operator-pinned verification token; bypasses the pool entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha_verify_param: Option<String>,
    /// Change-detection token; bumped on every edit.
    #[serde(default)]
    pub updated_at: i64,
}

fn default_qty() -> u32 {
    1
}

impl Target {
    /// The pinned verification token, if one is set and non-blank.
    pub fn pinned_verify_param(&self) -> Option<&str> {
        self.captcha_verify_param
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn is_rush(&self) -> bool {
        self.mode == TargetMode::Rush
    }

    /// Check the fields a purchase loop depends on. A target that fails this
    /// never gets a unit.
    pub fn validate(&self) -> Result<(), String> {
        if self.per_order_qty == 0 {
            return Err("per_order_qty must be at least 1".to_string());
        }
        if self.target_qty == 0 {
            return Err("target_qty must be at least 1".to_string());
        }
        Ok(())
    }

    /// Label for logs: the name when set, the id otherwise.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Operator-tunable settings persisted by the Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Shared budget for concurrent captcha solves (pool fills and fallbacks).
    #[serde(default = "default_max_concurrent_solvers")]
    pub max_concurrent_solvers: usize,
    #[serde(default)]
    pub captcha_pool: CaptchaPoolSettings,
}

fn default_max_concurrent_solvers() -> usize {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_solvers: default_max_concurrent_solvers(),
            captcha_pool: CaptchaPoolSettings::default(),
        }
    }
}
