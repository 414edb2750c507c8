//! Speech Handler - OpenAI 兼容合成端点

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::application::SpeechRequest;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SpeechRequestDto {
    pub input: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    pub model: Option<String>,

    pub response_format: Option<String>,
}

fn default_voice() -> String {
    "alloy".to_string()
}

/// POST /v1/audio/speech
pub async fn speech(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeechRequestDto>,
) -> Result<Response, ApiError> {
    let response = state
        .speech
        .synthesize(SpeechRequest {
            input: request.input,
            voice: request.voice,
            model: request.model,
            response_format: request.response_format,
        })
        .await?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, response.format.content_type())
        .header(header::CONTENT_LENGTH, response.audio.len())
        .body(Body::from(response.audio))
        .map_err(|e| ApiError::Internal(e.to_string()))?)
}
