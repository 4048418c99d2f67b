//! HTTP runtime backed by a shared `reqwest` client.

use crate::error::{LoadTestError, LoadTestResult};
use crate::metrics::MetricsCollector;
use crate::scenario::{LoadRuntime, RequestOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Issues real HTTP requests and records every one of them.
pub struct ReqwestRuntime {
    client: reqwest::Client,
    collector: Arc<RwLock<MetricsCollector>>,
}

impl ReqwestRuntime {
    pub fn new(timeout: Duration, collector: Arc<RwLock<MetricsCollector>>) -> LoadTestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kubeweb-loadtest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoadTestError::Runtime(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, collector })
    }

    async fn fetch(&self, url: &str) -> RequestOutcome {
        let start = Instant::now();

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return RequestOutcome {
                    status: None,
                    latency: start.elapsed(),
                    error: Some(describe(&e)),
                }
            }
        };

        let status = response.status().as_u16();
        // latency covers the whole body, not just the headers
        let error = response.bytes().await.err().map(|e| describe(&e));

        RequestOutcome {
            status: Some(status),
            latency: start.elapsed(),
            error,
        }
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timeout".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else if err.is_body() || err.is_decode() {
        "response body error".to_string()
    } else {
        err.to_string()
    }
}

#[async_trait]
impl LoadRuntime for ReqwestRuntime {
    async fn get(&self, url: &str) -> RequestOutcome {
        let outcome = self.fetch(url).await;

        let mut collector = self.collector.write().await;
        match (outcome.failed(), outcome.status) {
            (false, Some(status)) => collector.record_success(outcome.latency, status),
            _ => {
                debug!(
                    url,
                    status = ?outcome.status,
                    error = ?outcome.error,
                    "request failed"
                );
                collector.record_failure(outcome.latency, outcome.status, outcome.error.clone());
            }
        }

        outcome
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
