//! Speech Service - 请求管线
//!
//! 每个请求：命中分类（精确/模糊/未命中）-> 命中读文件并按需转码，
//! 未命中走降级链合成并写缓存。命中但文件被淘汰竞争删掉时，
//! 摘除热索引条目并按未命中重走。变体深度未满时调度后台预热
//!
//! 每次缓存操作产出一条结构化日志：
//! reason_code / text_preview（前 50 字符）/ voice_id / score / format

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::application::cache_service::{CacheError, CacheService};
use crate::application::fallback::{FallbackError, FallbackOrchestrator};
use crate::application::ports::{AudioFormat, AudioTranscoderPort};
use crate::infrastructure::memory::WarmupTracker;
use crate::infrastructure::storage::AudioStoreError;

/// 预热任务超时上限
const WARMUP_TIMEOUT: Duration = Duration::from_secs(30);

/// 管线错误
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Input text is empty")]
    EmptyInput,

    #[error("Unsupported response format: {0}")]
    BadFormat(String),

    #[error(transparent)]
    Fallback(#[from] FallbackError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// 合成请求
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub input: String,
    pub voice: String,
    pub model: Option<String>,
    pub response_format: Option<String>,
}

/// 合成响应
#[derive(Debug, Clone)]
pub struct SpeechResponse {
    pub audio: Vec<u8>,
    pub format: AudioFormat,
}

/// 管线配置
#[derive(Debug, Clone)]
pub struct SpeechServiceConfig {
    pub cache_enabled: bool,
    /// 超过该字符数的文本不进缓存
    pub max_text_length: usize,
    pub variety_depth: i64,
}

/// 请求管线
pub struct SpeechService {
    cache: Arc<CacheService>,
    fallback: Arc<FallbackOrchestrator>,
    transcoder: Arc<dyn AudioTranscoderPort>,
    warmup: Arc<WarmupTracker>,
    config: SpeechServiceConfig,
}

impl SpeechService {
    pub fn new(
        cache: Arc<CacheService>,
        fallback: Arc<FallbackOrchestrator>,
        transcoder: Arc<dyn AudioTranscoderPort>,
        warmup: Arc<WarmupTracker>,
        config: SpeechServiceConfig,
    ) -> Self {
        Self {
            cache,
            fallback,
            transcoder,
            warmup,
            config,
        }
    }

    /// 处理一次合成请求
    pub async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse, SpeechError> {
        let text = request.input.trim();
        if text.is_empty() {
            return Err(SpeechError::EmptyInput);
        }

        let requested_format = match &request.response_format {
            None => AudioFormat::Mp3,
            Some(tag) => {
                AudioFormat::parse(tag).ok_or_else(|| SpeechError::BadFormat(tag.clone()))?
            }
        };
        let voice = request.voice.as_str();
        let model = request.model.as_deref().unwrap_or("tts-1");

        if text.chars().count() > self.config.max_text_length {
            self.cache.record_miss();
            log_cache_op("miss_text_too_long", text, voice, None, requested_format);
            return self.forward(text, voice, model, requested_format).await;
        }

        if !self.config.cache_enabled {
            self.cache.record_miss();
            log_cache_op("miss_no_cache", text, voice, None, requested_format);
            return self.forward(text, voice, model, requested_format).await;
        }

        if let Some(hit) = self.cache.lookup(text, voice).await? {
            match self.cache.read_audio(&hit.path).await {
                Ok(audio) => {
                    log_cache_op(
                        hit.match_type.reason_code(),
                        text,
                        voice,
                        Some(hit.score),
                        requested_format,
                    );

                    // 命中路径上的变体预热：深度未满则补下一版本
                    let version_count = self.cache.version_count(&hit.matched, voice).await?;
                    if version_count < self.config.variety_depth {
                        self.schedule_warmup(hit.matched.clone(), voice.to_string(), model.to_string());
                    }

                    let cached_format = format_of_path(&hit.path);
                    let (audio, format) =
                        self.maybe_convert(audio, cached_format, requested_format).await;
                    return Ok(SpeechResponse { audio, format });
                }
                Err(AudioStoreError::FileNotFound(path)) => {
                    // 与淘汰任务竞争：文件已消失，摘掉热索引条目重走未命中
                    tracing::error!(
                        reason_code = "error_file_not_found",
                        path = %path,
                        voice_id = %voice,
                        "Cached audio file missing, re-routing as miss"
                    );
                    self.cache.hot().remove(&hit.matched, voice);
                }
                Err(e) => return Err(SpeechError::Storage(e.to_string())),
            }
        }

        // 未命中：合成、按需转码、以返回格式入缓存
        let outcome = self.fallback.synthesize(text, voice, model).await?;
        let (audio, format) = self
            .maybe_convert(outcome.audio, AudioFormat::Mp3, requested_format)
            .await;

        let stored = self.cache.store(text, voice, &audio, format.as_str()).await?;
        log_cache_op("miss", text, voice, None, format);

        if self.config.variety_depth > 1 && stored.version_num == 1 {
            self.schedule_warmup(
                stored.text_normalized.clone(),
                voice.to_string(),
                model.to_string(),
            );
        }

        Ok(SpeechResponse { audio, format })
    }

    /// 直接走降级链，不碰缓存（文本超长或缓存关闭）
    async fn forward(
        &self,
        text: &str,
        voice: &str,
        model: &str,
        requested_format: AudioFormat,
    ) -> Result<SpeechResponse, SpeechError> {
        let outcome = self.fallback.synthesize(text, voice, model).await?;
        let (audio, format) = self
            .maybe_convert(outcome.audio, AudioFormat::Mp3, requested_format)
            .await;
        Ok(SpeechResponse { audio, format })
    }

    /// 按需转码；失败回落到源格式，从不让请求失败
    async fn maybe_convert(
        &self,
        audio: Vec<u8>,
        src: AudioFormat,
        dst: AudioFormat,
    ) -> (Vec<u8>, AudioFormat) {
        if src == dst {
            return (audio, src);
        }

        match self
            .transcoder
            .convert(&audio, src.as_str(), dst.as_str())
            .await
        {
            Ok(converted) => (converted, dst),
            Err(e) => {
                tracing::warn!(
                    from = src.as_str(),
                    to = dst.as_str(),
                    error = %e,
                    "Format conversion failed, keeping source format"
                );
                (audio, src)
            }
        }
    }

    /// 调度下一版本的后台预热
    ///
    /// 在途集合按 (规范文本, 音色) 去重；任务限时 30 秒，失败只打
    /// WARN，不影响发起请求。store 自行派生版本号，这里只传规范文本
    /// （规范化幂等，键不会漂移）
    fn schedule_warmup(&self, text_normalized: String, voice: String, model: String) {
        if !self.warmup.try_begin(&text_normalized, &voice) {
            tracing::debug!(voice_id = %voice, "Warm-up already in flight, skipping");
            return;
        }

        let cache = self.cache.clone();
        let fallback = self.fallback.clone();
        let warmup = self.warmup.clone();

        tokio::spawn(async move {
            let result = tokio::time::timeout(
                WARMUP_TIMEOUT,
                run_warmup(&cache, &fallback, &text_normalized, &voice, &model),
            )
            .await;

            match result {
                Ok(Ok(version)) => {
                    tracing::debug!(voice_id = %voice, version = version, "Warm-up version stored")
                }
                Ok(Err(e)) => {
                    tracing::warn!(voice_id = %voice, error = %e, "Warm-up synthesis failed")
                }
                Err(_) => tracing::warn!(voice_id = %voice, "Warm-up timed out, abandoned"),
            }

            warmup.finish(&text_normalized, &voice);
        });
    }

    pub fn warmup_in_flight(&self) -> usize {
        self.warmup.in_flight_count()
    }
}

/// 预热任务体：合成并写入下一版本
async fn run_warmup(
    cache: &CacheService,
    fallback: &FallbackOrchestrator,
    text_normalized: &str,
    voice: &str,
    model: &str,
) -> Result<i64, SpeechError> {
    let outcome = fallback.synthesize(text_normalized, voice, model).await?;
    let stored = cache
        .store(text_normalized, voice, &outcome.audio, "mp3")
        .await?;
    Ok(stored.version_num)
}

/// 从缓存文件扩展名还原格式，无法识别时按 mp3 处理
fn format_of_path(path: &str) -> AudioFormat {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(AudioFormat::parse)
        .unwrap_or(AudioFormat::Mp3)
}

fn log_cache_op(
    reason_code: &str,
    text: &str,
    voice_id: &str,
    score: Option<u8>,
    format: AudioFormat,
) {
    let text_preview: String = text.chars().take(50).collect();
    tracing::info!(
        reason_code = reason_code,
        text_preview = %text_preview,
        voice_id = %voice_id,
        score = score,
        format = format.as_str(),
        "cache operation"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cache_service::CacheService;
    use crate::application::fallback::FallbackOrchestrator;
    use crate::application::ports::{TranscodeError, TtsProviderPort};
    use crate::config::FuzzyConfig;
    use crate::domain::normalizer::NormalizeConfig;
    use crate::infrastructure::adapters::tts::{FakeBehavior, FakeTtsProvider};
    use crate::infrastructure::memory::HotIndex;
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteCacheRepository,
    };
    use crate::infrastructure::storage::AudioStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 永远失败的转码器，驱动"回落到源格式"路径
    struct FailingTranscoder;

    #[async_trait]
    impl AudioTranscoderPort for FailingTranscoder {
        async fn convert(
            &self,
            _audio: &[u8],
            _src: &str,
            dst: &str,
        ) -> Result<Vec<u8>, TranscodeError> {
            Err(TranscodeError::Unsupported(dst.to_string()))
        }
    }

    struct Fixture {
        service: SpeechService,
        cache: Arc<CacheService>,
        provider: Arc<FakeTtsProvider>,
        _dir: TempDir,
    }

    async fn fixture(variety_depth: usize, cache_enabled: bool) -> Fixture {
        fixture_with_provider(
            Arc::new(FakeTtsProvider::with_audio("fake", b"provider-audio".to_vec())),
            variety_depth,
            cache_enabled,
        )
        .await
    }

    async fn fixture_with_provider(
        provider: Arc<FakeTtsProvider>,
        variety_depth: usize,
        cache_enabled: bool,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let repo = Arc::new(SqliteCacheRepository::new(pool));
        let hot = Arc::new(HotIndex::new(variety_depth));
        let store = AudioStore::new(dir.path()).await.unwrap();

        let cache = Arc::new(CacheService::new(
            repo,
            hot,
            store,
            NormalizeConfig::default(),
            &FuzzyConfig::default(),
            variety_depth,
        ));

        let fallback = Arc::new(FallbackOrchestrator::new(vec![
            provider.clone() as Arc<dyn TtsProviderPort>
        ]));

        let service = SpeechService::new(
            cache.clone(),
            fallback,
            Arc::new(FailingTranscoder),
            Arc::new(WarmupTracker::new()),
            SpeechServiceConfig {
                cache_enabled,
                max_text_length: 50,
                variety_depth: variety_depth as i64,
            },
        );

        Fixture {
            service,
            cache,
            provider,
            _dir: dir,
        }
    }

    fn request(input: &str) -> SpeechRequest {
        SpeechRequest {
            input: input.to_string(),
            voice: "v1".to_string(),
            model: None,
            response_format: None,
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit_without_second_provider_call() {
        let f = fixture(1, true).await;

        // 第一次：未命中，走上游并入缓存
        let first = f.service.synthesize(request("Hello, World!")).await.unwrap();
        assert_eq!(first.audio, b"provider-audio");
        assert_eq!(first.format, AudioFormat::Mp3);
        assert_eq!(f.provider.call_count(), 1);

        // 第二次：精确命中，上游不再被调用
        let second = f.service.synthesize(request("Hello, World!")).await.unwrap();
        assert_eq!(second.audio, b"provider-audio");
        assert_eq!(f.provider.call_count(), 1);

        // 规范化同键的变体也命中
        f.service.synthesize(request("hello world")).await.unwrap();
        assert_eq!(f.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let f = fixture(1, true).await;
        let err = f.service.synthesize(request("   ")).await.unwrap_err();
        assert!(matches!(err, SpeechError::EmptyInput));
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_format_rejected() {
        let f = fixture(1, true).await;
        let mut req = request("merhaba");
        req.response_format = Some("flac".to_string());

        let err = f.service.synthesize(req).await.unwrap_err();
        assert!(matches!(err, SpeechError::BadFormat(_)));
    }

    #[tokio::test]
    async fn test_too_long_text_bypasses_cache() {
        let f = fixture(1, true).await;
        let long_text = "a ".repeat(60);

        f.service.synthesize(request(&long_text)).await.unwrap();
        f.service.synthesize(request(&long_text)).await.unwrap();

        // 两次都打到上游，缓存里没有条目
        assert_eq!(f.provider.call_count(), 2);
        assert!(f.cache.lookup(&long_text, "v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_disabled_forwards_every_request() {
        let f = fixture(1, false).await;

        f.service.synthesize(request("merhaba")).await.unwrap();
        f.service.synthesize(request("merhaba")).await.unwrap();
        assert_eq!(f.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_on_hit_reroutes_as_miss() {
        let f = fixture(1, true).await;

        f.service.synthesize(request("merhaba")).await.unwrap();
        assert_eq!(f.provider.call_count(), 1);

        // 背后删掉音频文件，模拟与淘汰任务的竞争
        let hit = f.cache.lookup("merhaba", "v1").await.unwrap().unwrap();
        tokio::fs::remove_file(&hit.path).await.unwrap();

        let response = f.service.synthesize(request("merhaba")).await.unwrap();
        assert_eq!(response.audio, b"provider-audio");
        assert_eq!(f.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_upstream_exhaustion_creates_no_entry() {
        let provider = Arc::new(FakeTtsProvider::new("p1", FakeBehavior::Timeout));
        let f = fixture_with_provider(provider, 1, true).await;

        let err = f.service.synthesize(request("merhaba")).await.unwrap_err();
        assert!(matches!(err, SpeechError::Fallback(FallbackError::Exhausted(_))));
        assert!(f.cache.peek("merhaba", "v1").is_none());
    }

    #[tokio::test]
    async fn test_conversion_failure_falls_back_to_source_format() {
        let f = fixture(1, true).await;
        let mut req = request("merhaba");
        req.response_format = Some("wav".to_string());

        // FailingTranscoder 拒绝转换，响应回落到 mp3
        let response = f.service.synthesize(req).await.unwrap();
        assert_eq!(response.format, AudioFormat::Mp3);
    }

    #[tokio::test]
    async fn test_run_warmup_stores_next_version() {
        let f = fixture(3, true).await;

        // 直接种入 v1，避开 synthesize 自带的后台预热
        f.cache.store("merhaba", "v1", b"audio", "mp3").await.unwrap();

        let normalized = f.cache.normalize("merhaba");
        let fallback = FallbackOrchestrator::new(vec![
            f.provider.clone() as Arc<dyn TtsProviderPort>
        ]);

        let version = run_warmup(&f.cache, &fallback, &normalized, "v1", "tts-1")
            .await
            .unwrap();
        assert_eq!(version, 2);
        assert_eq!(f.cache.version_count(&normalized, "v1").await.unwrap(), 2);

        let version = run_warmup(&f.cache, &fallback, &normalized, "v1", "tts-1")
            .await
            .unwrap();
        assert_eq!(version, 3);

        // 深度已满，继续预热只会覆盖最后一个版本
        let version = run_warmup(&f.cache, &fallback, &normalized, "v1", "tts-1")
            .await
            .unwrap();
        assert_eq!(version, 3);
        assert_eq!(f.cache.version_count(&normalized, "v1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_warmup_scheduled_after_first_store() {
        let f = fixture(2, true).await;

        f.service.synthesize(request("merhaba")).await.unwrap();

        // 后台任务最终把版本数推到 2
        let normalized = f.cache.normalize("merhaba");
        for _ in 0..50 {
            if f.cache.version_count(&normalized, "v1").await.unwrap() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(f.cache.version_count(&normalized, "v1").await.unwrap(), 2);
        assert_eq!(f.provider.call_count(), 2);
    }

    #[test]
    fn test_format_of_path() {
        assert_eq!(format_of_path("/data/audio/abc.mp3"), AudioFormat::Mp3);
        assert_eq!(format_of_path("/data/audio/abc.wav"), AudioFormat::Wav);
        assert_eq!(format_of_path("/data/audio/abc"), AudioFormat::Mp3);
    }
}
