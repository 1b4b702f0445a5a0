//! Shared concurrency budget for captcha solves.
//!
//! Pool fills and synchronous fallback solves draw from the same semaphore so
//! the solver backend is never driven past the configured limit.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

pub struct SolverGate {
    semaphore: Arc<Semaphore>,
    capacity: Mutex<usize>,
}

impl SolverGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity: Mutex::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        *self.capacity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a solve slot.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).acquire_owned().await.ok()
    }

    /// Change the limit. Shrinking takes effect as in-flight solves finish.
    pub fn resize(&self, capacity: usize) -> usize {
        let capacity = capacity.max(1);
        let mut current = self.capacity.lock().unwrap_or_else(PoisonError::into_inner);
        if capacity > *current {
            self.semaphore.add_permits(capacity - *current);
        } else if capacity < *current {
            let excess = (*current - capacity) as u32;
            match Arc::clone(&self.semaphore).try_acquire_many_owned(excess) {
                Ok(permits) => permits.forget(),
                Err(_) => {
                    let semaphore = Arc::clone(&self.semaphore);
                    tokio::spawn(async move {
                        if let Ok(permits) = semaphore.acquire_many_owned(excess).await {
                            permits.forget();
                        }
                    });
                }
            }
        }
        debug!(from = *current, to = capacity, "Solver gate resized");
        *current = capacity;
        capacity
    }
}
