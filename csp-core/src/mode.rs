//! Override modes and the mode detector

use crate::rules::{HeaderAction, HeaderRule};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the three mutually exclusive modes is active for an origin
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverrideMode {
    /// No override; the page runs under the policy it actually serves
    #[default]
    #[serde(rename = "mode-existing")]
    Existing,
    /// A custom policy replaces the served header
    #[serde(rename = "mode-override")]
    Override,
    /// A report-only policy replaces the served header and reports to the collector
    #[serde(rename = "mode-suggest")]
    Suggest,
}

impl OverrideMode {
    pub const ALL: [OverrideMode; 3] = [
        OverrideMode::Existing,
        OverrideMode::Override,
        OverrideMode::Suggest,
    ];

    /// Classify the effective mode from the rule installed for an origin.
    ///
    /// A rule whose header is not one of ours counts as `Existing`.
    pub fn detect(rule: Option<&HeaderRule>) -> Self {
        match rule.and_then(HeaderRule::header_action) {
            Some(HeaderAction::Override { .. }) => OverrideMode::Override,
            Some(HeaderAction::ReportOnly { .. }) => OverrideMode::Suggest,
            None => OverrideMode::Existing,
        }
    }

    /// Whether this mode is backed by an installed header rule
    pub fn has_rule(self) -> bool {
        !matches!(self, OverrideMode::Existing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverrideMode::Existing => "mode-existing",
            OverrideMode::Override => "mode-override",
            OverrideMode::Suggest => "mode-suggest",
        }
    }
}

impl fmt::Display for OverrideMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
