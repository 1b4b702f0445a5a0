//! Trait definitions for the provider module.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{OrderRequest, OrderResult, PreflightResult, ProviderReply};
use crate::store::{Account, Target};

/// Errors surfaced by the session layer. The engine treats them as opaque.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request could not be delivered.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Upstream rejected the request.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Reply could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Talks to the upstream shop on behalf of one account.
///
/// `create_order` is not idempotent; callers must not replay it without fresh
/// preflight data.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the name of this provider implementation.
    fn name(&self) -> &str;

    /// Check eligibility and price for the target.
    async fn preflight(
        &self,
        account: &Account,
        target: &Target,
    ) -> Result<ProviderReply<PreflightResult>, ProviderError>;

    /// Commit an order using the result of a preceding preflight.
    async fn create_order(
        &self,
        account: &Account,
        target: &Target,
        request: &OrderRequest,
    ) -> Result<ProviderReply<OrderResult>, ProviderError>;
}
