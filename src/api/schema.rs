use crate::ax_state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

/// 已知表及其列映射 (供上游提示词与前端展示)
pub async fn list_schemas(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tables: Vec<_> = state.engine.schemas().tables().into_iter().cloned().collect();
    Json(tables)
}
