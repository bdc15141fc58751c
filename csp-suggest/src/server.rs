use crate::policy::suggest_policy;
use crate::SuggestError;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use csp_common::{hostname_of, ReportEnvelope, ViolationReport, CSP_REPORT_CONTENT_TYPE, CSP_REPORT_PATH};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

/// Violation reports collected per document hostname
#[derive(Clone, Default)]
pub struct AppState {
    reports: Arc<DashMap<String, Vec<ViolationReport>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a report under its document's hostname and return that hostname
    pub fn record(&self, report: ViolationReport) -> Result<String, SuggestError> {
        let host = hostname_of(&report.document_uri).ok_or_else(|| {
            SuggestError::InvalidReport(format!("document-uri '{}' has no host", report.document_uri))
        })?;
        debug!("Collected violation {}", report);
        self.reports.entry(host.clone()).or_default().push(report);
        Ok(host)
    }

    pub fn suggestion_for(&self, host: &str) -> Result<String, SuggestError> {
        self.reports
            .get(host)
            .and_then(|reports| suggest_policy(&reports))
            .ok_or_else(|| SuggestError::NotFound {
                host: host.to_string(),
            })
    }

    pub fn clear(&self, host: &str) -> usize {
        self.reports
            .remove(host)
            .map(|(_, reports)| reports.len())
            .unwrap_or_default()
    }

    pub fn report_count(&self, host: &str) -> usize {
        self.reports.get(host).map(|reports| reports.len()).unwrap_or_default()
    }

    pub fn host_count(&self) -> usize {
        self.reports.len()
    }
}

#[derive(Serialize)]
pub struct WelcomeResponse {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    hosts: usize,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::OPTIONS,
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-origin")]);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(
            CSP_REPORT_PATH,
            get(suggest_handler)
                .post(collect_handler)
                .delete(reset_handler)
                .options(|| async { StatusCode::OK }),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Serve on an already bound listener until the server fails
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), SuggestError> {
    if let Ok(addr) = listener.local_addr() {
        info!("CSP Suggest service listening on http://{}", addr);
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Bind `host:port` and serve
pub async fn start_service(host: &str, port: u16, state: AppState) -> Result<(), SuggestError> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| SuggestError::Bind { addr, source })?;
    serve(listener, state).await
}

async fn root_handler() -> Json<WelcomeResponse> {
    let endpoint = |method: &str, description: &str| EndpointInfo {
        path: CSP_REPORT_PATH.to_string(),
        method: method.to_string(),
        description: description.to_string(),
    };

    Json(WelcomeResponse {
        service: "CSP Suggest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            endpoint(
                "POST",
                "report-uri target; collects application/csp-report violation reports",
            ),
            endpoint(
                "GET",
                "Suggested policy accommodating the reports collected for the X-Origin page",
            ),
            endpoint("DELETE", "Discard the reports collected for the X-Origin page"),
        ],
    })
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        hosts: state.host_count(),
    })
}

async fn collect_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, String)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(CSP_REPORT_CONTENT_TYPE) {
        return Err(SuggestError::UnsupportedContentType {
            expected: CSP_REPORT_CONTENT_TYPE.to_string(),
            actual: content_type.to_string(),
        }
        .into());
    }

    let envelope: ReportEnvelope = serde_json::from_slice(&body)
        .map_err(|e| SuggestError::InvalidReport(e.to_string()))?;
    let host = state.record(envelope.csp_report)?;
    debug!("{} report(s) collected for {}", state.report_count(&host), host);

    Ok(StatusCode::OK)
}

async fn suggest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<String, (StatusCode, String)> {
    let host = requested_host(&headers).ok_or(SuggestError::MissingOrigin)?;
    let suggestion = state.suggestion_for(&host)?;
    info!("Suggested policy for {}: {}", host, suggestion);
    Ok(suggestion)
}

async fn reset_handler(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(host) = requested_host(&headers) {
        let removed = state.clear(&host);
        info!("Cleared {} report(s) for {}", removed, host);
    }
    StatusCode::OK
}

fn requested_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get(csp_common::X_ORIGIN_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(hostname_of)
}
