//! Events the engine publishes to the log bus.

use serde::Serialize;
use tracing::warn;

use crate::logbus::LogBus;
use crate::notify::OrderCreatedEvent;

use super::types::TaskState;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    EngineStatus { running: bool },
    TaskState { state: TaskState },
    OrderCreated { order: OrderCreatedEvent },
    CaptchaPool { size: usize, desired: usize, activated: bool },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::EngineStatus { .. } => "engine_status",
            EngineEvent::TaskState { .. } => "task_state",
            EngineEvent::OrderCreated { .. } => "order_created",
            EngineEvent::CaptchaPool { .. } => "captcha_pool",
        }
    }

    pub fn publish(self, bus: &LogBus) {
        match serde_json::to_value(&self) {
            Ok(payload) => {
                bus.publish(self.kind(), payload);
            }
            Err(e) => warn!(kind = self.kind(), error = %e, "Failed to encode engine event"),
        }
    }
}
