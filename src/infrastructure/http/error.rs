//! HTTP Error Handling
//!
//! 对外是 OpenAI 兼容面，错误用真实 HTTP 状态码：
//! 上游耗尽/无提供方 -> 503，上游拒绝 -> 透传其状态码，
//! 参数问题 -> 400，其余 -> 500

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::{FallbackError, SpeechError};

/// 统一错误响应格式
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// API 错误
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    /// 上游拒绝，按上游状态码透传
    Upstream(u16, String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(error = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::NotFound(msg) => {
                tracing::warn!(error = %msg, "Resource not found");
                (StatusCode::NOT_FOUND, msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::error!(error = %msg, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::Upstream(status, msg) => {
                tracing::warn!(status = status, error = %msg, "Upstream rejection");
                (
                    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                    msg,
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<SpeechError> for ApiError {
    fn from(e: SpeechError) -> Self {
        match e {
            SpeechError::EmptyInput => ApiError::BadRequest(e.to_string()),
            SpeechError::BadFormat(_) => ApiError::BadRequest(e.to_string()),
            SpeechError::Fallback(FallbackError::NoProvider) => {
                ApiError::ServiceUnavailable(FallbackError::NoProvider.to_string())
            }
            SpeechError::Fallback(FallbackError::Exhausted(detail)) => {
                ApiError::ServiceUnavailable(FallbackError::Exhausted(detail).to_string())
            }
            SpeechError::Fallback(FallbackError::Rejected(inner)) => {
                let status = inner.status_code().unwrap_or(502);
                ApiError::Upstream(status, inner.to_string())
            }
            SpeechError::Cache(inner) => ApiError::Internal(inner.to_string()),
            SpeechError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}
