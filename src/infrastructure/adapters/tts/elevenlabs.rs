//! ElevenLabs TTS Client
//!
//! 上游 API:
//! POST {base_url}/v1/text-to-speech/{voice_id}
//! Header: xi-api-key
//! Request: {"text": "...", "model_id": "..."}  (JSON)
//! Response: audio/mpeg binary

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::classify_transport_error;
use crate::application::ports::{ProviderError, SynthesisRequest, TtsProviderPort};

#[derive(Debug, Serialize)]
struct ElevenLabsHttpRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// ElevenLabs 客户端配置
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub base_url: String,
    pub api_key: String,
    pub default_voice: String,
    pub default_model: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

/// ElevenLabs TTS 客户端
pub struct ElevenLabsProvider {
    name: String,
    client: Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsProvider {
    pub fn new(name: impl Into<String>, config: ElevenLabsConfig) -> Result<Self, ProviderError> {
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

    fn speech_url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            voice_id
        )
    }
}

#[async_trait]
impl TtsProviderPort for ElevenLabsProvider {
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

        let body = ElevenLabsHttpRequest {
            text: &request.text,
            model_id: model,
        };

        let response = self
            .client
            .post(self.speech_url(voice))
            .header("xi-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to read audio: {}", e)))
    }
}
