//! Filler Handlers - 填充语音端点
//!
//! /v1/cache/fillers 面向缓存池（按模板 + 音色），
//! /v1/fillers 面向 `<audio>/fillers/` 目录下的静态文件，带 ETag 缓存

use axum::{
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::application::{FillerOutcome, FillerStatus};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FillerQuery {
    #[serde(default = "default_voice")]
    pub voice_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateFillersRequest {
    #[serde(default = "default_voice")]
    pub voice_id: String,
}

fn default_voice() -> String {
    "alloy".to_string()
}

#[derive(Serialize)]
pub struct FillerListResponse {
    pub fillers: Vec<FillerStatus>,
}

#[derive(Serialize)]
pub struct GenerateFillersResponse {
    pub results: Vec<FillerOutcome>,
}

/// GET /v1/cache/fillers?voice_id=...
pub async fn list_fillers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FillerQuery>,
) -> Json<FillerListResponse> {
    Json(FillerListResponse {
        fillers: state.fillers.list(&query.voice_id),
    })
}

/// POST /v1/cache/fillers/generate
pub async fn generate_fillers(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateFillersRequest>,
) -> Json<GenerateFillersResponse> {
    Json(GenerateFillersResponse {
        results: state.fillers.generate(&request.voice_id).await,
    })
}

#[derive(Serialize)]
pub struct FillerFilesResponse {
    pub fillers: Vec<String>,
}

/// GET /v1/fillers - 列出 fillers/ 目录下的音频文件名
pub async fn list_filler_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FillerFilesResponse>, ApiError> {
    let mut names = Vec::new();

    match tokio::fs::read_dir(&state.fillers_dir).await {
        Ok(mut dir) => {
            while let Ok(Some(entry)) = dir.next_entry().await {
                let path = entry.path();
                let is_audio = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext == "mp3" || ext == "ogg")
                    .unwrap_or(false);
                if is_audio && path.is_file() {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    }

    names.sort();
    Ok(Json(FillerFilesResponse { fillers: names }))
}

/// GET /v1/fillers/:name - 下载填充音频，支持 ETag/304
pub async fn download_filler(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // 路径遍历防护：名称只允许单段
    if name.contains('/') || name.contains("..") {
        return Err(ApiError::BadRequest("Invalid filler name".to_string()));
    }

    let (path, content_type) = find_filler_file(&state.fillers_dir, &name)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Filler '{}' not found", name)))?;

    // ETag 由 mtime + size 派生
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let etag = format!("{:x}", md5::compute(format!("{}:{}", mtime, metadata.len())));

    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok())
    {
        if if_none_match.trim_matches('"') == etag {
            return Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .body(Body::empty())
                .map_err(|e| ApiError::Internal(e.to_string()));
        }
    }

    let audio = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ETAG, format!("\"{}\"", etag))
        .body(Body::from(audio))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// 依次尝试 .mp3 / .ogg
async fn find_filler_file(fillers_dir: &PathBuf, name: &str) -> Option<(PathBuf, &'static str)> {
    for (ext, mime) in [("mp3", "audio/mpeg"), ("ogg", "audio/ogg")] {
        let candidate = fillers_dir.join(format!("{}.{}", name, ext));
        if tokio::fs::metadata(&candidate).await.is_ok() {
            return Some((candidate, mime));
        }
    }
    None
}
