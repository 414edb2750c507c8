//! Fallback Orchestrator - 上游提供方降级链
//!
//! 按配置顺序尝试各提供方；可降级错误（传输/超时/服务侧失败）继续
//! 走链，请求被拒类错误立即上抛。链耗尽返回 UpstreamExhausted（503）

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::application::ports::{ProviderError, SynthesisRequest, TtsProviderPort};
use crate::config::{ProviderKind, ProvidersConfig};
use crate::infrastructure::adapters::tts::{
    ElevenLabsConfig, ElevenLabsProvider, FakeTtsProvider, OpenAiCompatConfig,
    OpenAiCompatProvider,
};
use std::collections::HashMap;

/// 降级链错误
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("No TTS provider configured")]
    NoProvider,

    #[error("TTS unavailable: all fallback providers failed ({0})")]
    Exhausted(String),

    /// 请求本身被上游拒绝，换提供方也无济于事
    #[error(transparent)]
    Rejected(ProviderError),
}

/// 合成成功的结果
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub audio: Vec<u8>,
    /// 实际产出音频的提供方名称
    pub provider: String,
}

/// 凭据是否实际可用
///
/// 空串、纯空白与未解析的 `${VAR}` 占位符都视为缺失，
/// 未配置的提供方会被干净地跳过
pub fn has_credentials(api_key: &str) -> bool {
    let stripped = api_key.trim();
    if stripped.is_empty() {
        return false;
    }
    !(stripped.starts_with("${") && stripped.ends_with('}'))
}

/// 上游降级编排器
pub struct FallbackOrchestrator {
    providers: Vec<Arc<dyn TtsProviderPort>>,
    voice_mapping: HashMap<String, HashMap<String, String>>,
    model_mapping: HashMap<String, HashMap<String, String>>,
    last_error_time: Mutex<Option<DateTime<Utc>>>,
}

impl FallbackOrchestrator {
    pub fn new(providers: Vec<Arc<dyn TtsProviderPort>>) -> Self {
        Self {
            providers,
            voice_mapping: HashMap::new(),
            model_mapping: HashMap::new(),
            last_error_time: Mutex::new(None),
        }
    }

    /// 按配置实例化降级链
    ///
    /// 只实例化凭据齐备的提供方；链里引用但缺配置的名称跳过并告警
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut providers: Vec<Arc<dyn TtsProviderPort>> = Vec::new();

        for name in &config.fallback_chain {
            let Some(provider_config) = config.configs.get(name) else {
                tracing::warn!(provider = %name, "Provider in fallback_chain has no config, skipping");
                continue;
            };

            if provider_config.kind != ProviderKind::Fake
                && !has_credentials(&provider_config.api_key)
            {
                tracing::warn!(provider = %name, "Skipping provider because api_key is empty");
                continue;
            }

            let built: Result<Arc<dyn TtsProviderPort>, ProviderError> = match provider_config.kind
            {
                ProviderKind::OpenAi => OpenAiCompatProvider::new(
                    name.clone(),
                    OpenAiCompatConfig {
                        base_url: provider_config.base_url.clone(),
                        api_key: provider_config.api_key.clone(),
                        default_voice: provider_config.default_voice.clone(),
                        default_model: provider_config.default_model.clone(),
                        timeout_secs: provider_config.timeout_s,
                    },
                )
                .map(|p| Arc::new(p) as Arc<dyn TtsProviderPort>),
                ProviderKind::ElevenLabs => ElevenLabsProvider::new(
                    name.clone(),
                    ElevenLabsConfig {
                        base_url: provider_config.base_url.clone(),
                        api_key: provider_config.api_key.clone(),
                        default_voice: provider_config.default_voice.clone(),
                        default_model: provider_config.default_model.clone(),
                        timeout_secs: provider_config.timeout_s,
                    },
                )
                .map(|p| Arc::new(p) as Arc<dyn TtsProviderPort>),
                ProviderKind::Fake => Ok(Arc::new(FakeTtsProvider::with_audio(
                    name.clone(),
                    b"fake-audio".to_vec(),
                )) as Arc<dyn TtsProviderPort>),
            };

            match built {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "Failed to build provider, skipping")
                }
            }
        }

        if providers.is_empty() {
            tracing::warn!("No TTS providers configured; synthesis will fail on cache miss");
        } else {
            tracing::info!(count = providers.len(), "Fallback chain initialized");
        }

        Self {
            providers,
            voice_mapping: config.voice_mapping.clone(),
            model_mapping: config.model_mapping.clone(),
            last_error_time: Mutex::new(None),
        }
    }

    /// 链是否非空
    pub fn available(&self) -> bool {
        !self.providers.is_empty()
    }

    /// 最近一次上游失败时间（/health 用）
    pub fn last_error_time(&self) -> Option<DateTime<Utc>> {
        *self.last_error_time.lock().unwrap()
    }

    fn record_error(&self) {
        *self.last_error_time.lock().unwrap() = Some(Utc::now());
    }

    fn map_voice(&self, voice: &str, provider: &str) -> String {
        self.voice_mapping
            .get(voice)
            .and_then(|per_provider| per_provider.get(provider))
            .cloned()
            .unwrap_or_else(|| voice.to_string())
    }

    fn map_model(&self, model: &str, provider: &str) -> String {
        self.model_mapping
            .get(model)
            .and_then(|per_provider| per_provider.get(provider))
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }

    /// 沿降级链合成
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        model: &str,
    ) -> Result<SynthesisOutcome, FallbackError> {
        if self.providers.is_empty() {
            return Err(FallbackError::NoProvider);
        }

        let mut errors: Vec<String> = Vec::new();

        for provider in &self.providers {
            let request = SynthesisRequest {
                text: text.to_string(),
                voice: self.map_voice(voice, provider.name()),
                model: self.map_model(model, provider.name()),
            };

            tracing::info!(provider = provider.name(), "fallback.try");

            match provider.synthesize(&request).await {
                Ok(audio) => {
                    tracing::info!(provider = provider.name(), "fallback.success");
                    return Ok(SynthesisOutcome {
                        audio,
                        provider: provider.name().to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        status = ?e.status_code(),
                        error = %e,
                        "fallback.fail"
                    );
                    self.record_error();
                    errors.push(format!("{}: {}", provider.name(), e));

                    if !e.is_fallback_eligible() {
                        return Err(FallbackError::Rejected(e));
                    }
                }
            }
        }

        Err(FallbackError::Exhausted(errors.join("; ")))
    }
}
