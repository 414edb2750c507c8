//! Cache Admin Handlers - 缓存统计与清空

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::application::ports::CacheStats;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 统计响应：DB 聚合统计 + 热索引规模
#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hot_cache_size: usize,
}

/// GET /v1/cache/stats
pub async fn cache_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state
        .repo
        .get_stats()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(StatsResponse {
        stats,
        hot_cache_size: state.cache.hot().size(),
    }))
}

/// 清空结果
#[derive(Serialize)]
pub struct ClearResponse {
    pub cleared_entries: usize,
    pub removed_files: usize,
}

/// DELETE /v1/cache
pub async fn cache_clear(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearResponse>, ApiError> {
    let (cleared_entries, removed_files) = state
        .cache
        .clear()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(
        cleared_entries = cleared_entries,
        removed_files = removed_files,
        "Cache cleared"
    );

    Ok(Json(ClearResponse {
        cleared_entries,
        removed_files,
    }))
}
