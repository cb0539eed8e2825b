//! HTTP 层集成测试：直接驱动 Router，不绑定端口

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use vibestepper::core::StepOrchestrator;
use vibestepper::llm::MockLlmClient;
use vibestepper::server::{router, AppState, SESSION_HEADER};
use vibestepper::session::MemorySessionStore;

fn app() -> Router {
    let orchestrator = StepOrchestrator::new(
        Arc::new(MockLlmClient),
        Arc::new(MemorySessionStore::new()),
    );
    router(Arc::new(AppState::new(orchestrator)))
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let session = response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, session, json)
}

fn keys(value: &Value) -> Vec<&str> {
    let mut keys: Vec<&str> = value
        .as_object()
        .map(|o| o.keys().map(String::as_str).collect())
        .unwrap_or_default();
    keys.sort();
    keys
}

#[tokio::test]
async fn test_missing_session_id_is_bad_request() {
    let app = app();
    for path in ["/step1", "/step2", "/step3", "/step4", "/step5", "/step6"] {
        let (status, _, body) = send(&app, post(path, serde_json::json!({"code": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(keys(&body), vec!["error"]);
        assert!(body["error"].as_str().unwrap().contains("session_id"));
    }
}

#[tokio::test]
async fn test_step1_returns_contract_keys_and_echoes_session() {
    let app = app();
    let (status, session, body) = send(
        &app,
        post("/step1", serde_json::json!({"session_id": "s1", "code": "buggy loop"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(session.as_deref(), Some("s1"));
    assert_eq!(
        keys(&body),
        vec!["mre_file", "options", "question", "run_result", "step"]
    );
    assert_eq!(body["step"], "Step 1/6");
    assert_eq!(body["options"]["1"], "确认");
}

#[tokio::test]
async fn test_precondition_failure_is_conflict() {
    let app = app();
    let (status, _, body) = send(
        &app,
        post("/step2", serde_json::json!({"session_id": "nobody", "choice": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(keys(&body), vec!["error"]);
}

#[tokio::test]
async fn test_session_header_fallback_and_full_flow() {
    let app = app();
    let with_header = |path: &str, body: Value| {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(SESSION_HEADER, "hdr")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let (status, session, _) = send(&app, with_header("/step1", serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session.as_deref(), Some("hdr"));

    let (_, _, body) = send(&app, with_header("/step2", serde_json::json!({"choice": "x"}))).await;
    assert_eq!(keys(&body), vec!["message", "step"]);

    let (_, _, body) = send(&app, with_header("/step2", serde_json::json!({"choice": "1"}))).await;
    assert_eq!(body["hypotheses"][0]["id"], "a");

    let (status, _, body) =
        send(&app, with_header("/step3", serde_json::json!({"choice": "a"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hypothesis"]["id"], "a");

    let (_, _, body) = send(&app, with_header("/step4", serde_json::json!({"choice": "1"}))).await;
    assert!(body["patch"].as_str().unwrap().starts_with("--- "));

    let (status, _, body) =
        send(&app, with_header("/step4", serde_json::json!({"choice": "9"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(keys(&body), vec!["error"]);

    let (_, _, body) = send(&app, with_header("/step5", serde_json::json!({"choice": "1"}))).await;
    assert_eq!(body["regression_results"]["case_001"], "✅");

    let request = Request::builder()
        .method("POST")
        .uri("/step6")
        .header(SESSION_HEADER, "hdr")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["step"], "Step 6/6");
    assert!(!body["summary"]["step4_fix_patch"].is_null());
    assert!(!body["summary"]["step5_regression"].is_null());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/step1")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    send(&app, post("/step1", serde_json::json!({"session_id": "m1"}))).await;
    let request = Request::builder().uri("/api/metrics").body(Body::empty()).unwrap();
    let (_, _, body) = send(&app, request).await;
    assert_eq!(body["sessions"], 1);
}

#[tokio::test]
async fn test_numeric_choice_is_accepted() {
    let app = app();
    send(&app, post("/step1", serde_json::json!({"session_id": "n1"}))).await;

    let (status, _, body) = send(
        &app,
        post("/step2", serde_json::json!({"session_id": "n1", "choice": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["step"], "Step 2/6");
    assert!(body["hypotheses"].is_array());
}

#[tokio::test]
async fn test_cors_allows_browser_clients() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/step1")
        .header("origin", "http://localhost:5173")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({"session_id": "c1"}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
    let exposed = response
        .headers()
        .get("access-control-expose-headers")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(exposed.contains(SESSION_HEADER));
}
