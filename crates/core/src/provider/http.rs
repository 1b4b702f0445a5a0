//! HTTP adapter for the session gateway.
//!
//! The gateway owns cookie jars, proxies, retries and the upstream protocol.
//! This adapter only forwards account + target as JSON and decodes the reply.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::store::{Account, Target};

use super::traits::{Provider, ProviderError};
use super::types::{OrderRequest, OrderResult, PreflightResult, ProviderReply};

#[derive(Serialize)]
struct PreflightBody<'a> {
    account: &'a Account,
    target: &'a Target,
}

#[derive(Serialize)]
struct OrderBody<'a> {
    account: &'a Account,
    target: &'a Target,
    #[serde(flatten)]
    request: &'a OrderRequest,
}

/// `Provider` backed by the session gateway's HTTP API.
pub struct HttpProvider {
    client: Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Calling session gateway");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn preflight(
        &self,
        account: &Account,
        target: &Target,
    ) -> Result<ProviderReply<PreflightResult>, ProviderError> {
        self.post("/preflight", &PreflightBody { account, target })
            .await
    }

    async fn create_order(
        &self,
        account: &Account,
        target: &Target,
        request: &OrderRequest,
    ) -> Result<ProviderReply<OrderResult>, ProviderError> {
        self.post(
            "/orders",
            &OrderBody {
                account,
                target,
                request,
            },
        )
        .await
    }
}
