//! CSP violation reports as posted by browsers to a `report-uri`
//!
//! Follows the CSP Level 2 report format:
//! <https://www.w3.org/TR/CSP2/#violation-reports>

use serde::{Deserialize, Serialize};

/// The JSON body a browser posts: `{"csp-report": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEnvelope {
    #[serde(rename = "csp-report")]
    pub csp_report: ViolationReport,
}

/// A single violation of the policy in force when the page loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ViolationReport {
    /// URI of the resource that was blocked, or a keyword such as `inline`
    pub blocked_uri: String,
    pub document_uri: String,
    pub effective_directive: String,
    /// The policy text the browser evaluated, including `report-uri`
    pub original_policy: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub status_code: u16,
    pub violated_directive: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
}

impl ViolationReport {
    /// `host:port` origin of the document that produced the report
    pub fn document_origin(&self) -> Option<String> {
        crate::origin::to_origin(&self.document_uri)
    }
}

impl std::fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.document_origin().unwrap_or_default(),
            self.violated_directive,
            self.blocked_uri
        )
    }
}
