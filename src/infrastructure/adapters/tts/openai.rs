//! OpenAI-Compatible TTS Client
//!
//! 实现 TtsProviderPort trait，通过 HTTP 调用 OpenAI 兼容的
//! `/audio/speech` 端点（OpenAI / MiniMax / GateAI 等）
//!
//! 上游 API:
//! POST {base_url}/audio/speech
//! Request: {"model": "...", "input": "...", "voice": "...", "response_format": "mp3"}  (JSON)
//! Response: audio/mpeg binary

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::classify_transport_error;
use crate::application::ports::{ProviderError, SynthesisRequest, TtsProviderPort};

/// 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct SpeechHttpRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// OpenAI 兼容客户端配置
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// 服务基础 URL
    pub base_url: String,
    pub api_key: String,
    /// 请求里音色为空时的兜底音色
    pub default_voice: String,
    pub default_model: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

/// OpenAI 兼容 TTS 客户端
pub struct OpenAiCompatProvider {
    name: String,
    client: Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, config: OpenAiCompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            client,
            config,
        })
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TtsProviderPort for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError> {
        let voice = if request.voice.is_empty() {
            &self.config.default_voice
        } else {
            &request.voice
        };
        let model = if request.model.is_empty() {
            &self.config.default_model
        } else {
            &request.model
        };

        let body = SpeechHttpRequest {
            model,
            input: &request.text,
            voice,
            response_format: "mp3",
        };

        tracing::debug!(
            provider = %self.name,
            url = %self.speech_url(),
            text_len = request.text.len(),
            voice = %voice,
            "Sending TTS request"
        );

        let response = self
            .client
            .post(self.speech_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();

        tracing::debug!(provider = %self.name, audio_size = audio.len(), "TTS synthesis completed");

        Ok(audio)
    }
}
