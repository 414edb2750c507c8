//! HTTP Routes
//!
//! API Endpoints:
//! - /v1/audio/speech           POST    合成（OpenAI 兼容）
//! - /health                    GET     健康检查
//! - /v1/cache/stats            GET     缓存统计
//! - /v1/cache                  DELETE  清空缓存
//! - /v1/cache/fillers          GET     填充语音缓存状态
//! - /v1/cache/fillers/generate POST    生成填充语音池
//! - /v1/fillers                GET     列出静态填充音频
//! - /v1/fillers/:name          GET     下载填充音频（ETag/304）

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/v1", v1_routes())
}

/// /v1 路由
fn v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/audio/speech", post(handlers::speech))
        .route("/cache", delete(handlers::cache_clear))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/fillers", get(handlers::list_fillers))
        .route("/cache/fillers/generate", post(handlers::generate_fillers))
        .route("/fillers", get(handlers::list_filler_files))
        .route("/fillers/:name", get(handlers::download_filler))
}
