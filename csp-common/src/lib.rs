//! Common wire types for the CSP override tooling
//!
//! Shared between the override engine (`csp-core`), which talks to the
//! violation collector, and the collector itself (`csp-suggest`).

pub mod origin;
pub mod report;

pub use origin::{hostname_of, to_origin};
pub use report::{ReportEnvelope, ViolationReport};

/// Header carrying the page URL a suggestion request is about
pub const X_ORIGIN_HEADER: &str = "X-Origin";

/// MIME type browsers use when posting to a `report-uri`
pub const CSP_REPORT_CONTENT_TYPE: &str = "application/csp-report";

/// Path the collector serves reports and suggestions on
pub const CSP_REPORT_PATH: &str = "/csp-report";
