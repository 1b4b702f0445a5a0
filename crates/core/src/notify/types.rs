use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Emitted once per successful order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub event_id: String,
    pub target_id: String,
    pub target_name: String,
    pub item_id: String,
    pub sku_id: String,
    pub account_id: String,
    /// Masked mobile number of the buying account.
    pub account_mobile: String,
    pub order_id: Option<String>,
    pub trace_id: String,
    pub quantity: u32,
    pub total_fee: i64,
    pub created_at_ms: i64,
}

/// Delivery failures. Logged by the worker, never surfaced to the engine.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Request(String),

    #[error("webhook returned HTTP {0}")]
    Status(u16),
}
