//! Mock provider for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::provider::{
    OrderRequest, OrderResult, PreflightResult, Provider, ProviderError, ProviderReply,
};
use crate::store::{Account, Target};

/// A completed create_order call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedOrder {
    pub account_id: String,
    pub target_id: String,
    pub sku_id: String,
    pub request: OrderRequest,
}

#[derive(Debug)]
struct ProviderBehavior {
    can_buy: bool,
    need_captcha: bool,
    total_fee: i64,
    preflight_error: Option<String>,
    order_success: bool,
    order_delay: Duration,
    updated_account: Option<Account>,
}

impl Default for ProviderBehavior {
    fn default() -> Self {
        Self {
            can_buy: true,
            need_captcha: false,
            total_fee: 9900,
            preflight_error: None,
            order_success: true,
            order_delay: Duration::ZERO,
            updated_account: None,
        }
    }
}

/// Mock implementation of the Provider trait.
///
/// By default every preflight is purchasable without a captcha and every
/// order succeeds immediately. Orders are recorded only once the (optional)
/// delay has elapsed, so a call abandoned mid-flight never shows up.
#[derive(Debug, Default)]
pub struct MockProvider {
    behavior: Arc<RwLock<ProviderBehavior>>,
    preflight_calls: AtomicUsize,
    order_calls: AtomicUsize,
    orders: Arc<RwLock<Vec<RecordedOrder>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_can_buy(&self, can_buy: bool) {
        self.behavior.write().await.can_buy = can_buy;
    }

    pub async fn set_need_captcha(&self, need_captcha: bool) {
        self.behavior.write().await.need_captcha = need_captcha;
    }

    /// Make every preflight fail with `error` until cleared.
    pub async fn set_preflight_error(&self, error: Option<String>) {
        self.behavior.write().await.preflight_error = error;
    }

    pub async fn set_order_success(&self, success: bool) {
        self.behavior.write().await.order_success = success;
    }

    pub async fn set_order_delay(&self, delay: Duration) {
        self.behavior.write().await.order_delay = delay;
    }

    /// Hand this account back from every call as the updated session.
    pub async fn set_updated_account(&self, account: Option<Account>) {
        self.behavior.write().await.updated_account = account;
    }

    pub fn preflight_calls(&self) -> usize {
        self.preflight_calls.load(Ordering::SeqCst)
    }

    /// Number of create_order calls started, including abandoned ones.
    pub fn order_calls(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }

    /// Completed create_order calls.
    pub async fn orders(&self) -> Vec<RecordedOrder> {
        self.orders.read().await.clone()
    }

    fn reply<T>(value: T, updated: Option<Account>) -> ProviderReply<T> {
        match updated {
            Some(account) => ProviderReply::new(value).with_account(account),
            None => ProviderReply::new(value),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn preflight(
        &self,
        _account: &Account,
        target: &Target,
    ) -> Result<ProviderReply<PreflightResult>, ProviderError> {
        let n = self.preflight_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = self.behavior.read().await;
        if let Some(error) = &behavior.preflight_error {
            return Err(ProviderError::Upstream(error.clone()));
        }

        let result = PreflightResult {
            can_buy: behavior.can_buy,
            total_fee: behavior.total_fee * i64::from(target.per_order_qty),
            trace_id: format!("trace-{}", n),
            need_captcha: behavior.need_captcha,
            message: (!behavior.can_buy).then(|| "sold out".to_string()),
        };
        Ok(Self::reply(result, behavior.updated_account.clone()))
    }

    async fn create_order(
        &self,
        account: &Account,
        target: &Target,
        request: &OrderRequest,
    ) -> Result<ProviderReply<OrderResult>, ProviderError> {
        let n = self.order_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let (delay, success, updated) = {
            let behavior = self.behavior.read().await;
            (
                behavior.order_delay,
                behavior.order_success,
                behavior.updated_account.clone(),
            )
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if success {
            self.orders.write().await.push(RecordedOrder {
                account_id: account.id.clone(),
                target_id: target.id.clone(),
                sku_id: target.sku_id.clone(),
                request: request.clone(),
            });
        }

        let result = OrderResult {
            success,
            order_id: success.then(|| format!("order-{}", n)),
            trace_id: request.preflight.trace_id.clone(),
            message: (!success).then(|| "order refused".to_string()),
        };
        Ok(Self::reply(result, updated))
    }
}
