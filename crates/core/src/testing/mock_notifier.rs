//! Mock notifier for testing.

use std::sync::{Mutex, PoisonError};

use crate::notify::{Notifier, OrderCreatedEvent};

/// Records every order-created event it is handed.
#[derive(Debug, Default)]
pub struct MockNotifier {
    events: Mutex<Vec<OrderCreatedEvent>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OrderCreatedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for MockNotifier {
    fn notify_order_created(&self, event: OrderCreatedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
