//! Mock captcha solver for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::captcha::{CaptchaSolver, SolveError, SolveMetrics, SolveOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Succeed,
    Fail,
    Empty,
}

/// Mock implementation of the CaptchaSolver trait.
///
/// Successful solves return unique tokens (`tok-1`, `tok-2`, ...). The mock
/// tracks how many solves ran at once so tests can assert concurrency bounds.
#[derive(Debug)]
pub struct MockSolver {
    behavior: Behavior,
    delay: Arc<RwLock<Duration>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    session_tokens: Arc<RwLock<Vec<String>>>,
}

impl Default for MockSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSolver {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            session_tokens: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A solver that always succeeds.
    pub fn new() -> Self {
        Self::with_behavior(Behavior::Succeed)
    }

    /// A solver that always fails.
    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Fail)
    }

    /// A solver that reports success with a blank token.
    pub fn returning_empty() -> Self {
        Self::with_behavior(Behavior::Empty)
    }

    /// Make every solve take `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of solves observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Session tokens passed to `solve`, in call order.
    pub async fn session_tokens(&self) -> Vec<String> {
        self.session_tokens.read().await.clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CaptchaSolver for MockSolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn solve(
        &self,
        _timestamp_ms: i64,
        session_token: &str,
    ) -> Result<SolveOutcome, SolveError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.session_tokens
            .write()
            .await
            .push(session_token.to_string());

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let metrics = SolveMetrics {
            attempts: 1,
            duration_ms: delay.as_millis() as u64,
        };
        match self.behavior {
            Behavior::Succeed => Ok(SolveOutcome {
                verify_param: format!("tok-{}", n),
                metrics,
            }),
            Behavior::Empty => Ok(SolveOutcome {
                verify_param: String::new(),
                metrics,
            }),
            Behavior::Fail => Err(SolveError::new("mock solver failure", metrics)),
        }
    }
}
