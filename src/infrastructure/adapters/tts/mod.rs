//! TTS Adapters - 上游 TTS 客户端

mod elevenlabs;
mod fake;
mod openai;

pub use elevenlabs::{ElevenLabsConfig, ElevenLabsProvider};
pub use fake::{FakeBehavior, FakeTtsProvider};
pub use openai::{OpenAiCompatConfig, OpenAiCompatProvider};

use crate::application::ports::ProviderError;

/// reqwest 传输层错误归类到封闭错误集合
pub(crate) fn classify_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else if err.is_connect() {
        ProviderError::NetworkError(format!("Cannot connect to TTS service: {}", err))
    } else {
        ProviderError::NetworkError(err.to_string())
    }
}
