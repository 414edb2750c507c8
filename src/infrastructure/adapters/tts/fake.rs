//! Fake TTS Client（测试与离线环境用，返回固定音频或预设错误）

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::application::ports::{ProviderError, SynthesisRequest, TtsProviderPort};

/// 预设行为
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// 返回固定音频字节
    Succeed(Vec<u8>),
    /// 模拟超时
    Timeout,
    /// 模拟指定状态码的上游失败
    Fail(u16),
}

/// Fake TTS 客户端
pub struct FakeTtsProvider {
    name: String,
    behavior: FakeBehavior,
    calls: AtomicUsize,
}

impl FakeTtsProvider {
    pub fn new(name: impl Into<String>, behavior: FakeBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    /// 固定音频的便捷构造
    pub fn with_audio(name: impl Into<String>, audio: Vec<u8>) -> Self {
        Self::new(name, FakeBehavior::Succeed(audio))
    }

    /// 已被调用的次数（断言"未触发上游"用）
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TtsProviderPort for FakeTtsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        match &self.behavior {
            FakeBehavior::Succeed(audio) => Ok(audio.clone()),
            FakeBehavior::Timeout => Err(ProviderError::Timeout),
            FakeBehavior::Fail(status) => {
                Err(ProviderError::from_status(*status, "fake provider failure"))
            }
        }
    }
}
