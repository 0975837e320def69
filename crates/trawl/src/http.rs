//! Built-in `http` provider: fetches a search URL per task.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use trawl_scheduler::{PipelineError, Provider, ProviderConfig, ProviderError, Task, TaskPipeline};
use trawl_store::ProviderBinding;

/// Provider id that bindings use to select this provider.
pub const HTTP_PROVIDER_ID: &str = "http";

/// Per-request timeout when a binding doesn't set `timeout_secs`.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Validates `url` and `timeout_secs` for bindings of the `http` provider.
#[derive(Debug, Default)]
pub struct HttpProvider;

impl Provider for HttpProvider {
    fn id(&self) -> &str {
        HTTP_PROVIDER_ID
    }

    fn configure(
        &self,
        binding: &ProviderBinding,
        blacklist: &[String],
    ) -> Result<ProviderConfig, ProviderError> {
        let config = ProviderConfig::from_binding(binding, blacklist);

        let url = config.require_str("url")?;
        Url::parse(url).map_err(|e| ProviderError::InvalidSetting {
            key: "url".to_string(),
            reason: e.to_string(),
        })?;

        timeout_setting(&config)?;
        Ok(config)
    }
}

fn timeout_setting(config: &ProviderConfig) -> Result<Option<Duration>, ProviderError> {
    match config.settings.get("timeout_secs") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .filter(|secs| *secs > 0)
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| ProviderError::InvalidSetting {
                key: "timeout_secs".to_string(),
                reason: format!("expected a positive integer, got {}", value),
            }),
    }
}

/// Errors from a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Fetches the binding's URL under a timeout and logs what came back.
///
/// Parsing listings, deduplication and notification delivery happen
/// downstream of this pipeline.
pub struct HttpPipeline {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpPipeline {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            default_timeout,
        }
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<(u16, usize), FetchError> {
        let request = async {
            let response = self.client.get(url).send().await?.error_for_status()?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body.len()))
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl TaskPipeline for HttpPipeline {
    async fn execute(&self, task: &Task) -> Result<(), PipelineError> {
        let url = task.provider.require_str("url")?;
        let timeout = timeout_setting(&task.provider)?.unwrap_or(self.default_timeout);

        let (status, bytes) = self.fetch(url, timeout).await?;
        info!(
            job_id = %task.job_id,
            provider = %task.provider_id(),
            status,
            bytes,
            blacklisted_terms = task.provider.blacklist.len(),
            adapters = task.adapters.len(),
            "fetched listings page"
        );
        Ok(())
    }
}
