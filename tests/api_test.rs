mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use a11y_scanner::config::{ScannerConfig, USER_ID_HEADER};
use a11y_scanner::credits::CreditLedger;
use a11y_scanner::server::build_router;
use a11y_scanner::state::{ScannerState, SharedState};
use a11y_scanner::store::ScanDb;

use common::{sample_snapshot, FailAt, FakeExtractor, StubInference, SAMPLE_REPLY};

fn test_state(signup_credits: i64, extractor: FakeExtractor) -> SharedState {
    let config = ScannerConfig {
        signup_credits,
        workers: 1,
        queue_capacity: 1,
        ..Default::default()
    };
    let db = Arc::new(ScanDb::open_in_memory().unwrap());
    ScannerState::new(
        config,
        db,
        Arc::new(extractor),
        Arc::new(StubInference::replying(SAMPLE_REPLY)),
    )
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_scan(user: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/scan")
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(user: Option<&str>, uri: &str) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    builder.body(Body::empty()).unwrap()
}

async fn poll_until_terminal(router: &Router, user: &str, scan_id: &str) -> serde_json::Value {
    for _ in 0..200 {
        let (status, body) = send(router, get(Some(user), &format!("/scan?scanId={}", scan_id))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "COMPLETED" || body["status"] == "FAILED" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan {} never reached a terminal state", scan_id);
}

#[tokio::test]
async fn test_end_to_end_single_credit() {
    let state = test_state(1, FakeExtractor::new(sample_snapshot()));
    let router = build_router(state.clone());

    let (status, body) = send(
        &router,
        post_scan(Some("user-u"), r#"{"url": "https://example.com", "level": "standard"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");
    let scan_id = body["scanId"].as_str().unwrap().to_string();

    assert_eq!(state.ledger.balance("user-u").unwrap(), 0);

    let (status, body) = send(
        &router,
        post_scan(Some("user-u"), r#"{"url": "https://example.com"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Insufficient scan credits");

    let scan = poll_until_terminal(&router, "user-u", &scan_id).await;
    assert_eq!(scan["status"], "COMPLETED");
    assert_eq!(scan["progress"], 100);
    assert_eq!(scan["score"], 62);
    assert_eq!(scan["level"], "standard");
    assert_eq!(scan["issues"].as_array().unwrap().len(), 4);
    assert_eq!(scan["issues"][0]["severity"], "CRITICAL");
    assert_eq!(scan["issues"][0]["type"], "Missing alt text");
}

#[tokio::test]
async fn test_failed_scan_still_consumes_credit() {
    let state = test_state(2, FakeExtractor::failing(FailAt::Navigate));
    let router = build_router(state.clone());

    let (status, body) = send(
        &router,
        post_scan(Some("user-f"), r#"{"url": "https://unreachable.test"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let scan_id = body["scanId"].as_str().unwrap().to_string();

    let scan = poll_until_terminal(&router, "user-f", &scan_id).await;
    assert_eq!(scan["status"], "FAILED");
    assert_eq!(scan["progress"], 0);
    assert!(scan["score"].is_null());
    assert!(scan["insights"].as_str().unwrap().starts_with("Scan failed:"));
    assert_eq!(state.ledger.balance("user-f").unwrap(), 1);
}

#[tokio::test]
async fn test_admission_errors() {
    let state = test_state(3, FakeExtractor::new(sample_snapshot()));
    let router = build_router(state.clone());

    let (status, body) = send(&router, post_scan(None, r#"{"url": "https://example.com"}"#)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");

    let (status, body) = send(&router, post_scan(Some("user-v"), r#"{"url": "example"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request data");
    assert_eq!(body["details"][0]["path"][0], "url");

    let (status, _) = send(
        &router,
        post_scan(Some("user-v"), r#"{"url": "https://example.com", "level": "extreme"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Rejected requests never touch the balance.
    assert_eq!(state.ledger.balance("user-v").unwrap(), 3);
}

#[tokio::test]
async fn test_zero_balance_checked_before_body() {
    let state = test_state(0, FakeExtractor::new(sample_snapshot()));
    let router = build_router(state);

    let (status, _) = send(&router, post_scan(Some("broke"), "not json")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_read_errors_and_ownership() {
    let state = test_state(1, FakeExtractor::new(sample_snapshot()));
    let router = build_router(state);

    let (_, body) = send(
        &router,
        post_scan(Some("owner"), r#"{"url": "https://example.com"}"#),
    )
    .await;
    let scan_id = body["scanId"].as_str().unwrap().to_string();

    let (status, _) = send(&router, get(None, &format!("/scan?scanId={}", scan_id))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&router, get(Some("owner"), "/scan")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Scan ID required");

    let (status, _) = send(&router, get(Some("intruder"), &format!("/scan?scanId={}", scan_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, get(Some("owner"), "/scan?scanId=does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_queue_full_does_not_spend_credit() {
    // Scans never get past launch, so the single worker and the single
    // queue slot fill up.
    let state = test_state(10, FakeExtractor::failing(FailAt::HangOnLaunch));
    let router = build_router(state.clone());

    let mut admitted = 0;
    let mut saw_full = false;
    for _ in 0..10 {
        let (status, body) = send(
            &router,
            post_scan(Some("busy"), r#"{"url": "https://example.com"}"#),
        )
        .await;
        match status {
            StatusCode::OK => admitted += 1,
            StatusCode::SERVICE_UNAVAILABLE => {
                assert!(body["error"].as_str().unwrap().contains("queue is full"));
                saw_full = true;
                break;
            }
            other => panic!("unexpected status {}", other),
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(saw_full);
    assert!(admitted >= 1);
    assert_eq!(state.ledger.balance("busy").unwrap(), 10 - admitted);

    let (status, body) = send(&router, get(None, "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"]["capacity"], 1);
    assert_eq!(body["queue"]["active"], 1);
}

#[tokio::test]
async fn test_list_and_stats() {
    let state = test_state(2, FakeExtractor::new(sample_snapshot()));
    let router = build_router(state);

    let (status, stats) = send(&router, get(Some("dash"), "/user/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalScans"], 0);
    assert_eq!(stats["scanCredits"], 2);

    let (_, body) = send(
        &router,
        post_scan(Some("dash"), r#"{"url": "https://example.com", "level": "strict"}"#),
    )
    .await;
    let scan_id = body["scanId"].as_str().unwrap().to_string();
    poll_until_terminal(&router, "dash", &scan_id).await;

    let (status, page) = send(&router, get(Some("dash"), "/scans?page=1&limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 1);
    assert_eq!(page["scans"][0]["id"], scan_id.as_str());
    assert_eq!(page["scans"][0]["issues"].as_array().unwrap().len(), 4);

    let (_, filtered) = send(&router, get(Some("dash"), "/scans?status=failed")).await;
    assert_eq!(filtered["pagination"]["total"], 0);

    let (status, _) = send(&router, get(Some("dash"), "/scans?status=bogus")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, stats) = send(&router, get(Some("dash"), "/user/stats")).await;
    assert_eq!(stats["totalScans"], 1);
    assert_eq!(stats["avgScore"], 62);
    assert_eq!(stats["criticalIssues"], 2);
    assert_eq!(stats["scanCredits"], 1);
}

#[tokio::test]
async fn test_activity_history() {
    let state = test_state(1, FakeExtractor::new(sample_snapshot()));
    let router = build_router(state);

    let (_, body) = send(
        &router,
        post_scan(Some("logger"), r#"{"url": "https://example.com"}"#),
    )
    .await;
    let scan_id = body["scanId"].as_str().unwrap().to_string();
    poll_until_terminal(&router, "logger", &scan_id).await;

    let (status, history) = send(&router, get(None, "/logs/history?limit=50")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = history["entries"].as_array().unwrap();
    assert!(entries
        .iter()
        .any(|e| e["source"] == "api" && e["scanId"] == scan_id.as_str()));

    let (status, timeline) = send(
        &router,
        get(None, &format!("/logs/history?scanId={}", scan_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = timeline["entries"].as_array().unwrap();
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e["scanId"] == scan_id.as_str()));
    assert!(entries.iter().any(|e| e["source"] == "api"));
    assert!(entries.iter().any(|e| e["source"] == "orchestrator"));

    let (_, other) = send(&router, get(None, "/logs/history?scanId=unknown")).await;
    assert_eq!(other["total"], 0);
}

#[tokio::test]
async fn test_list_with_huge_page_number() {
    let state = test_state(1, FakeExtractor::new(sample_snapshot()));
    let router = build_router(state);

    let (status, page) = send(
        &router,
        get(Some("pager"), "/scans?page=9223372036854775807&limit=10"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(page["scans"].as_array().unwrap().is_empty());
}
