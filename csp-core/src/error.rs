//! Error types for override operations

use crate::mode::OverrideMode;
use thiserror::Error;

/// Main error type for override operations
#[derive(Debug, Error)]
pub enum OverrideError {
    /// Malformed origin, rejected rule pattern, or missing/invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote collector could not be reached or answered with a failure
    #[error("Collector unavailable at {url}: {reason}")]
    CollectorUnavailable { url: String, reason: String },

    /// The collector has not captured any violations for this origin yet
    #[error("No suggested policy captured for {origin}")]
    NoSuggestion { origin: String },

    /// The rule store refused a batch update
    #[error("Rule store error: {0}")]
    RuleStore(String),

    /// Key-value storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A mode transition could not install its rule.
    /// `current` is the mode re-detected after the failure.
    #[error("Transition to {requested} failed, now in {current}: {source}")]
    TransitionFailed {
        requested: OverrideMode,
        current: OverrideMode,
        #[source]
        source: Box<OverrideError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OverrideError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub fn collector(url: &str, reason: impl std::fmt::Display) -> Self {
        Self::CollectorUnavailable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error is recovered locally by showing it to the user
    /// while leaving the current mode untouched
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OverrideError::CollectorUnavailable { .. } | OverrideError::NoSuggestion { .. }
        )
    }
}
