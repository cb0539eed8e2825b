//! 路由与处理函数：POST /step1 ~ /step6、GET /health、GET /api/metrics（允许跨域）
//!
//! 请求体 `{session_id?, code?, choice?}`；session_id 也可放在 `x-session-id` 头中，响应会回写该头。
//! 成功返回步骤载荷，失败统一返回 `{error}`。

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use crate::contract::StepIndex;
use crate::core::{ErrorBody, StepError, StepOrchestrator, StepRequest};

pub const SESSION_HEADER: &str = "x-session-id";

/// 服务共享状态
pub struct AppState {
    pub orchestrator: StepOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: StepOrchestrator) -> Self {
        Self { orchestrator }
    }
}

/// 步骤请求体（所有字段可缺省，缺 session_id 由编排器统一报错）
#[derive(Debug, Default, Deserialize)]
struct StepBody {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    code: Option<String>,
    /// 字符串或数字均可（"1" 与 1 等价）
    #[serde(default)]
    choice: Option<serde_json::Value>,
}

/// 选项原样转为字符串；非法值交由编排器统一按无效选项处理
fn choice_token(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    service: &'static str,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    sessions: usize,
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/step1", post(step1))
        .route("/step2", post(step2))
        .route("/step3", post(step3))
        .route("/step4", post(step4))
        .route("/step5", post(step5))
        .route("/step6", post(step6))
        .route("/health", get(health))
        .route("/api/metrics", get(metrics))
        // 浏览器前端跨域访问；x-session-id 需显式暴露才能被脚本读取
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([HeaderName::from_static(SESSION_HEADER)]),
        )
        .with_state(state)
}

/// 错误种类 → HTTP 状态码
pub fn status_for(err: &StepError) -> StatusCode {
    match err {
        StepError::MissingSessionId | StepError::InvalidChoice(_) => StatusCode::BAD_REQUEST,
        StepError::PreconditionNotMet { .. } => StatusCode::CONFLICT,
        StepError::UpstreamGenerationFailed(_) | StepError::InvalidUpstreamResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

/// 请求体优先，其次 x-session-id 头
fn parse_request(headers: &HeaderMap, body: &[u8]) -> Result<StepRequest, String> {
    let parsed: StepBody = if body.iter().all(u8::is_ascii_whitespace) {
        StepBody::default()
    } else {
        serde_json::from_slice(body).map_err(|e| format!("invalid request body: {}", e))?
    };

    let session_id = parsed
        .session_id
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            headers
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

    Ok(StepRequest {
        session_id,
        code: parsed.code.unwrap_or_default(),
        choice: parsed.choice.and_then(choice_token),
    })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T, session_id: Option<&str>) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id.trim()).ok()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}

async fn run_step(state: &AppState, step: StepIndex, headers: &HeaderMap, body: &[u8]) -> Response {
    let request = match parse_request(headers, body) {
        Ok(request) => request,
        Err(msg) => {
            tracing::info!(%step, "bad request: {}", msg);
            return json_response(StatusCode::BAD_REQUEST, &ErrorBody { error: msg }, None);
        }
    };

    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("step_request", %request_id, %step);
    let result = state
        .orchestrator
        .dispatch(step, &request)
        .instrument(span)
        .await;

    let session_id = request.session_id.as_deref();
    match result {
        Ok(outcome) => json_response(StatusCode::OK, &outcome, session_id),
        Err(e) => json_response(status_for(&e), &ErrorBody::from_error(&e, step), session_id),
    }
}

async fn step1(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    run_step(&state, StepIndex::Step1, &headers, &body).await
}

async fn step2(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    run_step(&state, StepIndex::Step2, &headers, &body).await
}

async fn step3(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    run_step(&state, StepIndex::Step3, &headers, &body).await
}

async fn step4(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    run_step(&state, StepIndex::Step4, &headers, &body).await
}

async fn step5(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    run_step(&state, StepIndex::Step5, &headers, &body).await
}

async fn step6(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    run_step(&state, StepIndex::Step6, &headers, &body).await
}

/// GET /health：健康检查
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Local::now().to_rfc3339(),
        service: "VibeStepper Backend",
    })
}

/// GET /api/metrics：会话数与 token 用量
async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    let (prompt_tokens, completion_tokens, total_tokens) = state.orchestrator.token_usage();
    Json(MetricsResponse {
        sessions: state.orchestrator.store().session_count().await,
        prompt_tokens,
        completion_tokens,
        total_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_prefers_body_session() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("from-header"));
        let req = parse_request(&headers, br#"{"session_id":"from-body","code":"x"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("from-body"));
        assert_eq!(req.code, "x");

        let req = parse_request(&headers, b"").unwrap();
        assert_eq!(req.session_id.as_deref(), Some("from-header"));
        assert_eq!(req.code, "");
    }

    #[test]
    fn test_parse_request_accepts_numeric_choice() {
        let req = parse_request(&HeaderMap::new(), br#"{"session_id":"s","choice":1}"#).unwrap();
        assert_eq!(req.choice.as_deref(), Some("1"));

        let req = parse_request(&HeaderMap::new(), br#"{"session_id":"s","choice":null}"#).unwrap();
        assert_eq!(req.choice, None);

        let req = parse_request(&HeaderMap::new(), br#"{"session_id":"s","choice":[1]}"#).unwrap();
        assert_eq!(req.choice.as_deref(), Some("[1]"));
    }

    #[test]
    fn test_parse_request_rejects_malformed_body() {
        assert!(parse_request(&HeaderMap::new(), b"{not json").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&StepError::MissingSessionId), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&StepError::unknown_selection("x")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&StepError::UpstreamGenerationFailed(crate::llm::LlmError::EmptyResponse)),
            StatusCode::BAD_GATEWAY
        );
    }
}
