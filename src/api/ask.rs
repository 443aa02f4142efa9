use crate::ax_state::AppState;
use crate::error::EngineError;
use crate::models::context::{AskRequest, TurnRequest};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// 单个提问：WHERE 子句 + 目标表 (+ 可选聚合)
pub async fn ask_database(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AskRequest>,
) -> impl IntoResponse {
    match state.engine.ask(&payload).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => error_response(e),
    }
}

/// 同一轮对话的多个提问 + 一致性校验
pub async fn ask_database_turn(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TurnRequest>,
) -> impl IntoResponse {
    if payload.questions.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "questions must not be empty" })))
            .into_response();
    }
    match state.engine.ask_turn(&payload).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => error_response(e),
    }
}

fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::UnknownTable(_) | EngineError::SchemaMismatch { .. } => StatusCode::BAD_REQUEST,
        EngineError::Execution(_) | EngineError::Timeout(_) => StatusCode::BAD_GATEWAY,
        EngineError::Aggregate { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn error_response(e: EngineError) -> axum::response::Response {
    let status = status_for(&e);
    warn!("提问处理失败 ({}): {}", status, e);
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
