//! TTS Provider Port - 上游合成服务抽象
//!
//! 定义上游 TTS 的抽象接口与封闭错误集合，
//! 具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use thiserror::Error;

/// Provider 错误（封闭集合，降级判定据此分派）
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request timeout")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("No TTS deployment configured")]
    NoDeployment,

    /// 上游服务侧失败（5xx / 429）
    #[error("Provider error (HTTP {status}): {message}")]
    ServiceError { status: u16, message: String },

    /// 请求本身被拒绝（4xx），换提供方也不会成功
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// 按 HTTP 状态码分类
    ///
    /// 429 与 5xx 视为服务侧失败，其余 4xx 视为请求被拒
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status >= 500 {
            ProviderError::ServiceError { status, message }
        } else {
            ProviderError::Rejected { status, message }
        }
    }

    /// 是否允许降级到下一个提供方
    ///
    /// 传输层失败、超时、无部署与服务侧失败可降级；
    /// 请求被拒（验证/鉴权类）与响应畸形立即上抛
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            ProviderError::Timeout
            | ProviderError::NetworkError(_)
            | ProviderError::NoDeployment
            | ProviderError::ServiceError { .. } => true,
            ProviderError::Rejected { .. } | ProviderError::InvalidResponse(_) => false,
        }
    }

    /// 上抛时对应的 HTTP 状态码
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::ServiceError { status, .. } | ProviderError::Rejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// 合成请求
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub model: String,
}

/// TTS Provider Port
///
/// 实现约定返回 mp3 字节；格式转换由管线负责
#[async_trait]
pub trait TtsProviderPort: Send + Sync {
    /// 提供方名称（用于日志与音色/模型映射）
    fn name(&self) -> &str;

    /// 合成音频
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError>;
}
