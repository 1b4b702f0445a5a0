//! HTTP adapter for the captcha solver sidecar.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::SolverConfig;

use super::traits::{CaptchaSolver, SolveError, SolveMetrics, SolveOutcome};

#[derive(Serialize)]
struct SolveBody<'a> {
    timestamp_ms: i64,
    session_token: &'a str,
}

#[derive(Deserialize)]
struct SolveReply {
    #[serde(default)]
    verify_param: String,
    #[serde(default = "one")]
    attempts: u32,
    #[serde(default)]
    error: Option<String>,
}

fn one() -> u32 {
    1
}

/// `CaptchaSolver` that delegates to a headless-browser sidecar over HTTP.
pub struct HttpCaptchaSolver {
    client: Client,
    base_url: String,
}

impl HttpCaptchaSolver {
    pub fn new(config: &SolverConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CaptchaSolver for HttpCaptchaSolver {
    fn name(&self) -> &str {
        "http"
    }

    async fn solve(
        &self,
        timestamp_ms: i64,
        session_token: &str,
    ) -> Result<SolveOutcome, SolveError> {
        let started = Instant::now();
        let metrics = |attempts: u32| SolveMetrics {
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        let url = format!("{}/solve", self.base_url);
        debug!(url = %url, "Requesting captcha solve");

        let response = self
            .client
            .post(&url)
            .json(&SolveBody {
                timestamp_ms,
                session_token,
            })
            .send()
            .await
            .map_err(|e| SolveError::new(format!("solver unreachable: {}", e), metrics(0)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SolveError::new(
                format!(
                    "solver HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ),
                metrics(1),
            ));
        }

        let reply: SolveReply = response
            .json()
            .await
            .map_err(|e| SolveError::new(format!("invalid solver reply: {}", e), metrics(1)))?;

        if let Some(error) = reply.error.filter(|e| !e.is_empty()) {
            return Err(SolveError::new(error, metrics(reply.attempts)));
        }

        Ok(SolveOutcome {
            verify_param: reply.verify_param,
            metrics: metrics(reply.attempts),
        })
    }
}
