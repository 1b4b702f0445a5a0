//! Append-and-broadcast buffer of structured events.
//!
//! Publishing never blocks: each subscriber has its own bounded channel and a
//! subscriber that falls behind misses messages without affecting the others.
//! The most recent entries are retained for late subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use crate::clock::now_ms;
use crate::config::LogBusConfig;

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number.
    pub id: u64,
    pub at_ms: i64,
    pub kind: String,
    pub payload: Value,
}

struct BusInner {
    next_id: u64,
    ring: VecDeque<LogEntry>,
    subscribers: Vec<mpsc::Sender<LogEntry>>,
}

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone)]
pub struct LogBus {
    inner: Arc<Mutex<BusInner>>,
    capacity: usize,
    subscriber_buffer: usize,
}

impl LogBus {
    pub fn new(capacity: usize, subscriber_buffer: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 1,
                ring: VecDeque::with_capacity(capacity.max(1)),
                subscribers: Vec::new(),
            })),
            capacity: capacity.max(1),
            subscriber_buffer: subscriber_buffer.max(1),
        }
    }

    pub fn from_config(config: &LogBusConfig) -> Self {
        Self::new(config.capacity, config.subscriber_buffer)
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry and fan it out to subscribers.
    pub fn publish(&self, kind: &str, payload: Value) -> LogEntry {
        let mut inner = self.lock();
        let entry = LogEntry {
            id: inner.next_id,
            at_ms: now_ms(),
            kind: kind.to_string(),
            payload,
        };
        inner.next_id += 1;

        if inner.ring.len() >= self.capacity {
            inner.ring.pop_front();
        }
        inner.ring.push_back(entry.clone());

        inner.subscribers.retain(|tx| match tx.try_send(entry.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(kind = %entry.kind, "Log bus subscriber full, dropping entry");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        entry
    }

    /// Receive every entry published from now on.
    pub fn subscribe(&self) -> mpsc::Receiver<LogEntry> {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        self.lock().subscribers.push(tx);
        rx
    }

    /// Up to `limit` most recent entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let inner = self.lock();
        let skip = inner.ring.len().saturating_sub(limit);
        inner.ring.iter().skip(skip).cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl Default for LogBus {
    fn default() -> Self {
        Self::from_config(&LogBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ring_keeps_latest() {
        let bus = LogBus::new(3, 4);
        for i in 0..5 {
            bus.publish("tick", json!({ "i": i }));
        }

        let recent = bus.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].payload["i"], 2);
        assert_eq!(recent[2].payload["i"], 4);
        assert_eq!(recent[2].id, 5);

        let last = bus.recent(1);
        assert_eq!(last[0].payload["i"], 4);
    }

    #[test]
    fn test_full_subscriber_only_misses_its_own() {
        let bus = LogBus::new(10, 1);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        bus.publish("a", json!(1));
        assert_eq!(fast.try_recv().unwrap().kind, "a");

        bus.publish("b", json!(2));
        assert_eq!(fast.try_recv().unwrap().kind, "b");

        assert_eq!(slow.try_recv().unwrap().kind, "a");
        assert!(slow.try_recv().is_err());
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_closed_subscribers_pruned() {
        let bus = LogBus::new(10, 4);
        let rx = bus.subscribe();
        let _keep = bus.subscribe();
        drop(rx);

        bus.publish("x", Value::Null);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let bus = LogBus::default();
        let mut rx = bus.subscribe();
        let clone = bus.clone();

        clone.publish("engine_status", json!({ "running": true }));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.kind, "engine_status");
        assert_eq!(bus.recent(5).len(), 1);
    }
}
