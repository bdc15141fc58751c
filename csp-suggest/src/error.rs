use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised by the CSP Suggest service
#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("Invalid POST request: expected {expected}, got {actual}")]
    UnsupportedContentType { expected: String, actual: String },

    #[error("Invalid violation report: {0}")]
    InvalidReport(String),

    #[error("Missing or invalid X-Origin header")]
    MissingOrigin,

    #[error("Records for {host} not found")]
    NotFound { host: String },

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SuggestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SuggestError::UnsupportedContentType { .. }
            | SuggestError::InvalidReport(_)
            | SuggestError::MissingOrigin => StatusCode::BAD_REQUEST,
            SuggestError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SuggestError> for (StatusCode, String) {
    fn from(err: SuggestError) -> Self {
        (err.status_code(), err.to_string())
    }
}
