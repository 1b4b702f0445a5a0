//! Types exchanged with the upstream session layer.

use serde::{Deserialize, Serialize};

use crate::store::Account;

/// Eligibility check computed before committing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightResult {
    pub can_buy: bool,
    /// Total price in the smallest currency unit.
    #[serde(default)]
    pub total_fee: i64,
    /// Upstream correlation id, threaded into order creation.
    #[serde(default)]
    pub trace_id: String,
    /// Whether order creation will demand a verification token.
    #[serde(default)]
    pub need_captcha: bool,
    /// Upstream reason when `can_buy` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Everything order creation needs beyond the account and target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Fresh preflight data; orders are never created from stale results.
    pub preflight: PreflightResult,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captcha_verify_param: Option<String>,
}

/// Outcome of an order-creation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A provider result plus the account snapshot, if the call changed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderReply<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_account: Option<Account>,
}

impl<T> ProviderReply<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            updated_account: None,
        }
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.updated_account = Some(account);
        self
    }
}
