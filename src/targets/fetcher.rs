use crate::error::FetchError;
use crate::k8s::AgentAddress;
use crate::targets::types::TargetStatusDocument;
use crate::{Result, TargetwatchError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Source of one agent's target status.
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn fetch(&self, agent: &AgentAddress)
        -> std::result::Result<TargetStatusDocument, FetchError>;
}

/// Fetches `/api/v1/targets` over HTTP with a hard per-request timeout.
#[derive(Clone)]
pub struct HttpTargetFetcher {
    client: reqwest::Client,
}

impl HttpTargetFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("targetwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                TargetwatchError::HttpClientError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    fn classify(url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

#[async_trait]
impl TargetSource for HttpTargetFetcher {
    async fn fetch(
        &self,
        agent: &AgentAddress,
    ) -> std::result::Result<TargetStatusDocument, FetchError> {
        let url = agent.targets_url();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::classify(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        // The body read is covered by the same client timeout.
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(&url, e))?;

        let document: TargetStatusDocument =
            serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
                url: url.clone(),
                source,
            })?;

        if document.is_error() {
            return Err(FetchError::Api {
                url,
                status: document.status,
            });
        }

        debug!(
            "Fetched {} active and {} dropped targets from {}",
            document.data.active_targets.len(),
            document.data.dropped_targets.len(),
            agent
        );

        Ok(document)
    }
}
