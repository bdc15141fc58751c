//! Configuration types and the settings store

use crate::store::KeyValueStore;
use crate::{OverrideError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Where the CSP Suggest collector listens by default
pub const DEFAULT_CSP_REPORT_SERVICE: &str = "http://localhost:18282/csp-report";

/// Baseline override for sites that serve no policy of their own
pub const DEFAULT_STARTER_CSP: &str = "default-src 'none'; script-src 'self'; connect-src 'self'; img-src 'self'; style-src 'self';base-uri 'self';form-action 'self'";

const SUGGEST_SERVICE_KEY: &str = "suggestService";
const STARTER_CSP_KEY: &str = "starterCSP";

/// Process-wide override settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideConfig {
    /// URL of the violation collector, used as the suggest policy's `report-uri`
    pub suggest_service: String,
    /// Policy used to seed an override when no served policy was observed
    #[serde(rename = "starterCSP")]
    pub starter_csp: String,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            suggest_service: DEFAULT_CSP_REPORT_SERVICE.to_string(),
            starter_csp: DEFAULT_STARTER_CSP.to_string(),
        }
    }
}

/// Reads and writes [`OverrideConfig`] values in a key-value store
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    /// Write the default settings. Run once on install or update.
    pub async fn init_defaults(&self) -> Result<()> {
        let defaults = OverrideConfig::default();
        info!("Initializing default settings (suggest service {})", defaults.suggest_service);
        self.storage
            .set(SUGGEST_SERVICE_KEY, defaults.suggest_service)
            .await?;
        self.storage.set(STARTER_CSP_KEY, defaults.starter_csp).await
    }

    /// The collector URL, re-validated since it is spliced into a header
    pub async fn suggest_service(&self) -> Result<String> {
        let stored = self.required(SUGGEST_SERVICE_KEY).await?;
        normalize_service_url(&stored)
    }

    pub async fn set_suggest_service(&self, value: &str) -> Result<()> {
        let normalized = normalize_service_url(value)?;
        self.storage.set(SUGGEST_SERVICE_KEY, normalized).await
    }

    pub async fn starter_csp(&self) -> Result<String> {
        self.required(STARTER_CSP_KEY).await
    }

    pub async fn set_starter_csp(&self, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(OverrideError::configuration("starter policy must not be empty"));
        }
        self.storage.set(STARTER_CSP_KEY, value.to_string()).await
    }

    pub async fn load(&self) -> Result<OverrideConfig> {
        Ok(OverrideConfig {
            suggest_service: self.suggest_service().await?,
            starter_csp: self.starter_csp().await?,
        })
    }

    async fn required(&self, key: &str) -> Result<String> {
        self.storage
            .get(key)
            .await?
            .ok_or_else(|| OverrideError::configuration(format!("setting '{}' is not configured", key)))
    }
}

/// Parse a collector URL and return its serialized form.
///
/// The value ends up after `report-uri` in a response header, so anything
/// that could end the directive or the header line is rejected.
fn normalize_service_url(value: &str) -> Result<String> {
    let value = value.trim();
    if let Some(bad) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || *c == ';' || *c == ',')
    {
        return Err(OverrideError::configuration(format!(
            "suggest service URL must not contain {:?}",
            bad
        )));
    }
    let parsed = url::Url::parse(value).map_err(|e| {
        OverrideError::configuration(format!("invalid suggest service URL '{}': {}", value, e))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.as_str().to_string()),
        other => Err(OverrideError::configuration(format!(
            "suggest service URL must be http or https, got '{}'",
            other
        ))),
    }
}
