//! Health Handler - 健康检查端点

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::infrastructure::http::state::AppState;

/// 健康检查响应
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// available / unavailable
    pub provider_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_time: Option<String>,
    pub cache_size: usize,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let provider_status = if state.fallback.available() {
        "available"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "ok",
        provider_status,
        last_error_time: state.fallback.last_error_time().map(|t| t.to_rfc3339()),
        cache_size: state.cache.hot().size(),
    })
}
