//! Client for the remote violation collector (CSP Suggest service)

use crate::{OverrideError, Result};
use async_trait::async_trait;
use csp_common::X_ORIGIN_HEADER;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info};

/// Source of suggested policies built from captured violation reports
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    /// Suggested policy for `page_url`, or `None` if nothing was captured yet
    async fn fetch_suggestion(&self, collector_url: &str, page_url: &str) -> Result<Option<String>>;

    /// Discard the captured reports for `page_url`
    async fn reset(&self, collector_url: &str, page_url: &str) -> Result<()>;
}

/// HTTP client for the collector's `/csp-report` endpoint
#[derive(Debug, Clone)]
pub struct CollectorClient {
    http: reqwest::Client,
}

impl CollectorClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new() -> Result<Self> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OverrideError::configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl SuggestionSource for CollectorClient {
    async fn fetch_suggestion(&self, collector_url: &str, page_url: &str) -> Result<Option<String>> {
        debug!("Fetching suggested policy for {} from {}", page_url, collector_url);

        let response = self
            .http
            .get(collector_url)
            .header(X_ORIGIN_HEADER, page_url)
            .send()
            .await
            .map_err(|e| OverrideError::collector(collector_url, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| OverrideError::collector(collector_url, e))?;
                let text = text.trim().to_string();
                Ok(if text.is_empty() { None } else { Some(text) })
            }
            status => Err(OverrideError::collector(collector_url, format!("HTTP {}", status))),
        }
    }

    async fn reset(&self, collector_url: &str, page_url: &str) -> Result<()> {
        info!("Resetting captured violations for {}", page_url);

        let response = self
            .http
            .delete(collector_url)
            .header(X_ORIGIN_HEADER, page_url)
            .send()
            .await
            .map_err(|e| OverrideError::collector(collector_url, e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(OverrideError::collector(
                collector_url,
                format!("HTTP {}", response.status()),
            ))
        }
    }
}
