//! TTL-bounded pool of pre-solved verification tokens.
//!
//! The pool is dormant until the wall clock reaches its activation time
//! (earliest rush deadline minus the warmup). From then on the maintainer keeps
//! it topped up. Expired tokens are evicted lazily by every read path.

use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::clock::now_ms;
use crate::store::Target;

use super::gate::SolverGate;
use super::settings::CaptchaPoolSettings;
use super::traits::CaptchaSolver;
use super::types::{
    CaptchaError, CaptchaPoolItem, CaptchaPoolItemView, CaptchaPoolStatus, FillMode, FillReport,
};

/// Hard ceiling on concurrent solves in a single fill.
pub const MAX_FILL_CONCURRENCY: usize = 50;

struct PoolInner {
    settings: CaptchaPoolSettings,
    items: VecDeque<CaptchaPoolItem>,
    activate_at_ms: Option<i64>,
    activated: bool,
}

impl PoolInner {
    fn evict_expired(&mut self, now_ms: i64) {
        let ttl_ms = self.settings.ttl_ms();
        self.items.retain(|item| !item.is_expired(ttl_ms, now_ms));
    }
}

/// Pool of solved tokens, consumed exactly once each.
pub struct CaptchaPool {
    inner: Mutex<PoolInner>,
    available: Notify,
}

impl CaptchaPool {
    pub fn new(settings: CaptchaPoolSettings) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                settings: settings.normalized(),
                items: VecDeque::new(),
                activate_at_ms: None,
                activated: false,
            }),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> CaptchaPoolSettings {
        self.lock().settings
    }

    /// Clamp and store new settings. The caller recomputes activation.
    pub fn set_settings(&self, settings: CaptchaPoolSettings) -> CaptchaPoolSettings {
        let normalized = settings.normalized();
        self.lock().settings = normalized;
        normalized
    }

    /// Number of non-expired tokens.
    pub fn size(&self, now_ms: i64) -> usize {
        let mut inner = self.lock();
        inner.evict_expired(now_ms);
        inner.items.len()
    }

    /// How many tokens the maintainer should add to reach the desired size.
    pub fn missing(&self, now_ms: i64) -> usize {
        let mut inner = self.lock();
        inner.evict_expired(now_ms);
        inner
            .settings
            .desired_size()
            .saturating_sub(inner.items.len())
    }

    /// Non-expired tokens with their remaining lifetime. Does not consume.
    pub fn snapshot(&self, now_ms: i64) -> Vec<CaptchaPoolItemView> {
        let mut inner = self.lock();
        inner.evict_expired(now_ms);
        let ttl_ms = inner.settings.ttl_ms();
        inner
            .items
            .iter()
            .map(|item| {
                let expires_at_ms = item.expires_at_ms(ttl_ms);
                CaptchaPoolItemView {
                    verify_param: item.verify_param.clone(),
                    solved_at_ms: item.solved_at_ms,
                    expires_at_ms,
                    remaining_ms: expires_at_ms - now_ms,
                }
            })
            .collect()
    }

    /// Insert a solved token. Blank tokens are rejected.
    pub fn add(
        &self,
        verify_param: &str,
        solved_at_ms: i64,
    ) -> Result<CaptchaPoolItem, CaptchaError> {
        let verify_param = verify_param.trim();
        if verify_param.is_empty() {
            return Err(CaptchaError::EmptyVerifyParam);
        }
        let item = CaptchaPoolItem {
            verify_param: verify_param.to_string(),
            solved_at_ms,
        };
        self.lock().items.push_back(item.clone());
        self.available.notify_one();
        Ok(item)
    }

    /// Remove and return the oldest non-expired token, if any.
    pub fn try_take(&self, now_ms: i64) -> Option<CaptchaPoolItem> {
        let mut inner = self.lock();
        inner.evict_expired(now_ms);
        inner.items.pop_front()
    }

    /// Wait up to `timeout` for a token. Dropping the future abandons the wait.
    pub async fn acquire(&self, timeout: Duration) -> Option<CaptchaPoolItem> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_take(now_ms()) {
                return Some(item);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return self.try_take(now_ms());
                }
            }
        }
    }

    /// Set the activation time. A time at or before `now_ms` activates the
    /// pool immediately; activation is never undone except by `reset_activation`.
    pub fn set_activate_at(&self, activate_at_ms: Option<i64>, now_ms: i64) {
        let mut inner = self.lock();
        inner.activate_at_ms = activate_at_ms;
        if !inner.activated && activate_at_ms.is_some_and(|at| at <= now_ms) {
            inner.activated = true;
            info!(activate_at_ms = ?activate_at_ms, "Captcha pool activated");
        }
    }

    pub fn activate_at_ms(&self) -> Option<i64> {
        self.lock().activate_at_ms
    }

    /// Whether the pool is active at `now_ms`, activating it if its time has come.
    pub fn is_activated(&self, now_ms: i64) -> bool {
        let mut inner = self.lock();
        if !inner.activated && inner.activate_at_ms.is_some_and(|at| at <= now_ms) {
            inner.activated = true;
            info!(activate_at_ms = ?inner.activate_at_ms, "Captcha pool activated");
        }
        inner.activated
    }

    /// Return to dormant. Used when the engine stops.
    pub fn reset_activation(&self) {
        let mut inner = self.lock();
        inner.activated = false;
        inner.activate_at_ms = None;
    }

    pub fn status(&self, now_ms: i64) -> CaptchaPoolStatus {
        let activated = self.is_activated(now_ms);
        let items = self.snapshot(now_ms);
        let inner = self.lock();
        CaptchaPoolStatus {
            settings: inner.settings,
            size: items.len(),
            desired: inner.settings.desired_size(),
            activated,
            activate_at_ms: inner.activate_at_ms,
            items,
        }
    }

    /// Run up to `count` solves (capped at `MAX_FILL_CONCURRENCY`), at most
    /// `min(gate capacity, count, MAX_FILL_CONCURRENCY)` at a time, and add
    /// every non-empty result. Individual failures are counted, never raised.
    pub async fn fill(
        &self,
        solver: &dyn CaptchaSolver,
        gate: &SolverGate,
        session_token: &str,
        count: usize,
        solve_timeout: Duration,
        mode: FillMode,
    ) -> FillReport {
        let attempts = count.min(MAX_FILL_CONCURRENCY);
        if attempts == 0 {
            return FillReport::default();
        }
        let concurrency = gate.capacity().min(attempts);
        debug!(attempts, concurrency, solver = solver.name(), "Starting captcha fill");

        let results: Vec<bool> = stream::iter(0..attempts)
            .map(|_| self.fill_one(solver, gate, session_token, solve_timeout, mode))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let added = results.iter().filter(|ok| **ok).count();
        let report = FillReport {
            requested: attempts,
            added,
            failed: attempts - added,
        };

        match mode {
            FillMode::Manual => info!(
                requested = report.requested,
                added = report.added,
                failed = report.failed,
                "Manual captcha fill finished"
            ),
            FillMode::Maintenance => debug!(
                requested = report.requested,
                added = report.added,
                failed = report.failed,
                "Captcha pool top-up finished"
            ),
        }
        report
    }

    async fn fill_one(
        &self,
        solver: &dyn CaptchaSolver,
        gate: &SolverGate,
        session_token: &str,
        solve_timeout: Duration,
        mode: FillMode,
    ) -> bool {
        let Some(_permit) = gate.acquire().await else {
            return false;
        };

        let result = match tokio::time::timeout(solve_timeout, solver.solve(now_ms(), session_token))
            .await
        {
            Ok(Ok(outcome)) if outcome.verify_param.trim().is_empty() => {
                Err(CaptchaError::EmptyResult(outcome.metrics))
            }
            Ok(Ok(outcome)) => self.add(&outcome.verify_param, now_ms()).map(|_| outcome),
            Ok(Err(e)) => Err(CaptchaError::Solve(e)),
            Err(_) => Err(CaptchaError::Timeout(solve_timeout.as_millis() as u64)),
        };

        match result {
            Ok(outcome) => {
                debug!(
                    attempts = outcome.metrics.attempts,
                    duration_ms = outcome.metrics.duration_ms,
                    "Captcha token added to pool"
                );
                true
            }
            Err(e) => {
                match mode {
                    FillMode::Manual => warn!(error = %e, "Captcha fill solve failed"),
                    FillMode::Maintenance => debug!(error = %e, "Captcha fill solve failed"),
                }
                false
            }
        }
    }
}

/// Earliest `rush_at_ms - warmup` over enabled rush targets, or `None` when
/// there are none.
pub fn activation_time(targets: &[Target], settings: &CaptchaPoolSettings) -> Option<i64> {
    let warmup_ms = settings.normalized().warmup_ms();
    targets
        .iter()
        .filter(|t| t.enabled && t.is_rush())
        .map(|t| t.rush_at_ms.saturating_sub(warmup_ms))
        .min()
}
