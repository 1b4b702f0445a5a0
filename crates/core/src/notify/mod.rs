//! Order-created notifications.
//!
//! The purchase loop hands events to a `Notifier` and moves on; delivery is
//! best-effort and never blocks an attempt.

mod types;
mod webhook;

pub use types::{NotifyError, OrderCreatedEvent};
pub use webhook::{create_notifier, NotifierWorker, WebhookNotifier};

/// Fire-and-forget sink for order events.
pub trait Notifier: Send + Sync {
    /// Queue an event. Must not block; a full queue drops the event.
    fn notify_order_created(&self, event: OrderCreatedEvent);
}
