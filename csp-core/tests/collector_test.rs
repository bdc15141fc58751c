use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use csp_core::{CollectorClient, OverrideError, SuggestionSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn suggest(headers: HeaderMap) -> (StatusCode, String) {
    let origin = headers
        .get("x-origin")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match origin {
        "https://a.test/" => (StatusCode::OK, "default-src 'none'; img-src 'self';\n".to_string()),
        "https://blank.test/" => (StatusCode::OK, "   ".to_string()),
        "https://b.test/" => (StatusCode::NOT_FOUND, "Records for b.test not found".to_string()),
        _ => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
    }
}

/// Serve a stub collector on an ephemeral port and return its report URL
async fn spawn_collector(deletes: Arc<AtomicUsize>) -> String {
    let app = Router::new().route(
        "/csp-report",
        get(suggest).delete(move || {
            let deletes = deletes.clone();
            async move {
                deletes.fetch_add(1, Ordering::SeqCst);
                StatusCode::NO_CONTENT
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/csp-report", addr)
}

#[tokio::test]
async fn test_fetch_returns_trimmed_suggestion() {
    let url = spawn_collector(Arc::default()).await;
    let client = CollectorClient::new().unwrap();

    let suggestion = client.fetch_suggestion(&url, "https://a.test/").await.unwrap();
    assert_eq!(suggestion.as_deref(), Some("default-src 'none'; img-src 'self';"));
}

#[tokio::test]
async fn test_not_found_and_blank_mean_no_suggestion() {
    let url = spawn_collector(Arc::default()).await;
    let client = CollectorClient::new().unwrap();

    assert_eq!(client.fetch_suggestion(&url, "https://b.test/").await.unwrap(), None);
    assert_eq!(client.fetch_suggestion(&url, "https://blank.test/").await.unwrap(), None);
}

#[tokio::test]
async fn test_server_error_is_collector_unavailable() {
    let url = spawn_collector(Arc::default()).await;
    let client = CollectorClient::new().unwrap();

    let err = client
        .fetch_suggestion(&url, "https://down.test/")
        .await
        .unwrap_err();
    match err {
        OverrideError::CollectorUnavailable { url: failed, reason } => {
            assert_eq!(failed, url);
            assert!(reason.contains("503"), "reason was {}", reason);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_collector() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = CollectorClient::with_timeout(Duration::from_secs(2)).unwrap();
    let err = client
        .fetch_suggestion(&format!("http://{}/csp-report", addr), "https://a.test/")
        .await
        .unwrap_err();
    assert!(matches!(err, OverrideError::CollectorUnavailable { .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_reset_issues_delete() {
    let deletes = Arc::new(AtomicUsize::new(0));
    let url = spawn_collector(deletes.clone()).await;
    let client = CollectorClient::new().unwrap();

    client.reset(&url, "https://a.test/").await.unwrap();
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
}
