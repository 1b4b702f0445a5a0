//! Target execution unit: the purchase loop for one target.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::captcha::CaptchaError;
use crate::clock::{now_ms, until};
use crate::notify::OrderCreatedEvent;
use crate::provider::{OrderRequest, PreflightResult, ProviderError};
use crate::store::{Account, StoreError, Target, TargetMode};

use super::coordinator::{drain_predecessor, Shared, TaskSlot};
use super::events::EngineEvent;
use super::stop::StopToken;
use super::types::{EngineError, NeedCaptcha};

/// Why a single attempt did not produce an order.
#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("unit stopped")]
    Stopped,

    #[error("no accounts available")]
    NoAccounts,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Captcha(#[from] CaptchaError),

    #[error("not purchasable: {0}")]
    NotPurchasable(String),

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("{0}")]
    Engine(String),
}

impl From<EngineError> for AttemptError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NoAccounts => AttemptError::NoAccounts,
            EngineError::Store(e) => AttemptError::Store(e),
            EngineError::Captcha(e) => AttemptError::Captcha(e),
            other => AttemptError::Engine(other.to_string()),
        }
    }
}

/// What the loop should do after an attempt.
enum Flow {
    Continue,
    Done,
}

pub(crate) struct ExecutionUnit {
    shared: Arc<Shared>,
    target: Target,
    generation: u64,
    stop: StopToken,
    predecessor: Option<TaskSlot>,
}

impl ExecutionUnit {
    pub(crate) fn new(
        shared: Arc<Shared>,
        target: Target,
        generation: u64,
        stop: StopToken,
        predecessor: Option<TaskSlot>,
    ) -> Self {
        Self {
            shared,
            target,
            generation,
            stop,
            predecessor,
        }
    }

    pub(crate) async fn run(mut self) {
        if let Some(slot) = self.predecessor.take() {
            drain_predecessor(
                &self.target.id,
                &slot,
                self.shared.config.restart_drain_timeout(),
            )
            .await;
        }

        if !self.stop.is_stopped() {
            info!(
                target_id = %self.target.id,
                name = %self.target.label(),
                mode = self.target.mode.as_str(),
                generation = self.generation,
                "Execution unit started"
            );
            match self.target.mode {
                TargetMode::Rush => self.run_rush().await,
                TargetMode::Scan => self.run_scan().await,
            }
        }

        self.shared
            .update_task(&self.target.id, self.generation, |s| s.running = false)
            .await;
        debug!(target_id = %self.target.id, generation = self.generation, "Execution unit exited");
    }

    async fn run_rush(&self) {
        let wait = until(self.target.rush_at_ms);
        if !wait.is_zero() {
            info!(
                target_id = %self.target.id,
                rush_at_ms = self.target.rush_at_ms,
                wait_ms = wait.as_millis() as u64,
                "Waiting for rush deadline"
            );
            if !self.stop.sleep(wait).await {
                return;
            }
        }

        let window_end = self
            .target
            .rush_at_ms
            .saturating_add(self.shared.config.rush_window_ms());

        loop {
            if self.stop.is_stopped() {
                return;
            }
            if now_ms() >= window_end {
                warn!(target_id = %self.target.id, "Rush window elapsed");
                self.shared
                    .update_task(&self.target.id, self.generation, |s| {
                        s.last_error = Some("rush window elapsed".to_string());
                    })
                    .await;
                return;
            }
            if let Flow::Done = self.attempt_and_record().await {
                return;
            }
            if !self
                .stop
                .sleep(self.shared.config.rush_retry_interval())
                .await
            {
                return;
            }
        }
    }

    async fn run_scan(&self) {
        loop {
            if self.stop.is_stopped() {
                return;
            }
            if let Flow::Done = self.attempt_and_record().await {
                return;
            }
            if !self.stop.sleep(self.shared.config.scan_interval()).await {
                return;
            }
        }
    }

    async fn attempt_and_record(&self) -> Flow {
        let started_ms = now_ms();
        let updated = self
            .shared
            .update_task(&self.target.id, self.generation, |s| {
                s.last_attempt_ms = Some(started_ms);
            })
            .await;
        if updated.is_none() {
            // Superseded by a newer unit.
            return Flow::Done;
        }

        match self.attempt().await {
            Ok(true) => Flow::Done,
            Ok(false) => Flow::Continue,
            Err(AttemptError::Stopped) => Flow::Done,
            Err(e) => {
                warn!(target_id = %self.target.id, error = %e, "Purchase attempt failed");
                let message = e.to_string();
                self.shared
                    .update_task(&self.target.id, self.generation, |s| {
                        s.last_error = Some(message);
                    })
                    .await;
                Flow::Continue
            }
        }
    }

    /// One pass of the purchase sequence. Returns whether the quota is met.
    async fn attempt(&self) -> Result<bool, AttemptError> {
        let account = self.shared.select_account().await?;

        let reply = tokio::select! {
            _ = self.stop.stopped() => return Err(AttemptError::Stopped),
            reply = self.shared.provider.preflight(&account, &self.target) => reply?,
        };
        if let Some(updated) = reply.updated_account {
            self.shared.save_account(updated).await;
        }
        let preflight = reply.value;
        self.shared
            .update_task(&self.target.id, self.generation, |s| {
                s.need_captcha = NeedCaptcha::from(preflight.need_captcha);
            })
            .await;

        if !preflight.can_buy {
            return Err(AttemptError::NotPurchasable(
                preflight
                    .message
                    .clone()
                    .unwrap_or_else(|| "preflight refused".to_string()),
            ));
        }

        let captcha_verify_param = self
            .captcha_verify_param_for_order(&account, preflight.need_captcha)
            .await?;

        let request = OrderRequest {
            preflight,
            quantity: self.target.per_order_qty,
            captcha_verify_param,
        };
        let reply = tokio::select! {
            _ = self.stop.stopped() => return Err(AttemptError::Stopped),
            reply = self.shared.provider.create_order(&account, &self.target, &request) => reply?,
        };
        if let Some(updated) = reply.updated_account {
            self.shared.save_account(updated).await;
        }
        let order = reply.value;
        if !order.success {
            return Err(AttemptError::OrderRejected(
                order.message.unwrap_or_else(|| "order not created".to_string()),
            ));
        }

        let success_ms = now_ms();
        let quantity = self.target.per_order_qty;
        let counted = self
            .shared
            .update_task(&self.target.id, self.generation, |s| {
                s.purchased_qty = s.purchased_qty.saturating_add(quantity);
                s.last_success_ms = Some(success_ms);
                s.last_error = None;
            })
            .await;

        info!(
            target_id = %self.target.id,
            account = %account.masked_mobile(),
            order_id = ?order.order_id,
            trace_id = %order.trace_id,
            quantity,
            counted = counted.is_some(),
            "Order created"
        );

        let event = self.order_event(
            &account,
            &request.preflight,
            order.order_id,
            order.trace_id,
            success_ms,
        );
        EngineEvent::OrderCreated {
            order: event.clone(),
        }
        .publish(&self.shared.bus);
        self.shared.notifier.notify_order_created(event);

        Ok(counted.map_or(true, |s| s.quota_met()))
    }

    /// Pick the verification token for an order: the pinned override, then a
    /// pooled token, then a direct solve on the shared solver budget.
    async fn captcha_verify_param_for_order(
        &self,
        account: &Account,
        need_captcha: bool,
    ) -> Result<Option<String>, AttemptError> {
        if let Some(pinned) = self.target.pinned_verify_param() {
            return Ok(Some(pinned.to_string()));
        }
        if !need_captcha {
            return Ok(None);
        }

        let pooled = tokio::select! {
            _ = self.stop.stopped() => return Err(AttemptError::Stopped),
            item = self.shared.pool.acquire(self.shared.captcha.acquire_timeout()) => item,
        };
        if let Some(item) = pooled {
            debug!(target_id = %self.target.id, "Using pooled captcha token");
            return Ok(Some(item.verify_param));
        }

        debug!(target_id = %self.target.id, "Captcha pool empty, solving directly");
        let _permit = tokio::select! {
            _ = self.stop.stopped() => return Err(AttemptError::Stopped),
            permit = self.shared.gate.acquire() => permit,
        };

        let solve_timeout = self.shared.captcha.solve_timeout();
        let solved = tokio::select! {
            _ = self.stop.stopped() => return Err(AttemptError::Stopped),
            solved = tokio::time::timeout(
                solve_timeout,
                self.shared.solver.solve(now_ms(), &account.token),
            ) => solved,
        };

        match solved {
            Ok(Ok(outcome)) if outcome.verify_param.trim().is_empty() => {
                Err(CaptchaError::EmptyResult(outcome.metrics).into())
            }
            Ok(Ok(outcome)) => {
                debug!(
                    target_id = %self.target.id,
                    attempts = outcome.metrics.attempts,
                    duration_ms = outcome.metrics.duration_ms,
                    "Captcha solved directly"
                );
                Ok(Some(outcome.verify_param))
            }
            Ok(Err(e)) => Err(CaptchaError::Solve(e).into()),
            Err(_) => Err(CaptchaError::Timeout(solve_timeout.as_millis() as u64).into()),
        }
    }

    fn order_event(
        &self,
        account: &Account,
        preflight: &PreflightResult,
        order_id: Option<String>,
        trace_id: String,
        created_at_ms: i64,
    ) -> OrderCreatedEvent {
        OrderCreatedEvent {
            event_id: Uuid::new_v4().to_string(),
            target_id: self.target.id.clone(),
            target_name: self.target.name.clone(),
            item_id: self.target.item_id.clone(),
            sku_id: self.target.sku_id.clone(),
            account_id: account.id.clone(),
            account_mobile: account.masked_mobile(),
            order_id,
            trace_id,
            quantity: self.target.per_order_qty,
            total_fee: preflight.total_fee,
            created_at_ms,
        }
    }
}
