//! Filler Manager - 填充语音池
//!
//! 预生成一组固定的应答短语（"稍等""在看了"之类），对话层在等待
//! 长回复时先播。生成走正常的降级链 + 缓存写入；已缓存的模板跳过

use serde::Serialize;
use std::sync::Arc;

use crate::application::cache_service::CacheService;
use crate::application::fallback::FallbackOrchestrator;
use crate::config::FillerTemplate;

/// 单个模板的生成结果
#[derive(Debug, Clone, Serialize)]
pub struct FillerOutcome {
    pub id: String,
    pub text: String,
    /// exists / generated / error
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 单个模板的缓存状态
#[derive(Debug, Clone, Serialize)]
pub struct FillerStatus {
    pub id: String,
    pub text: String,
    pub cached: bool,
    pub audio_path: Option<String>,
}

/// 填充语音管理器
pub struct FillerManager {
    cache: Arc<CacheService>,
    fallback: Arc<FallbackOrchestrator>,
    templates: Vec<FillerTemplate>,
}

impl FillerManager {
    pub fn new(
        cache: Arc<CacheService>,
        fallback: Arc<FallbackOrchestrator>,
        templates: Vec<FillerTemplate>,
    ) -> Self {
        Self {
            cache,
            fallback,
            templates,
        }
    }

    /// 为指定音色生成全部模板
    pub async fn generate(&self, voice_id: &str) -> Vec<FillerOutcome> {
        let mut outcomes = Vec::with_capacity(self.templates.len());

        for template in &self.templates {
            if self.cache.peek(&template.text, voice_id).is_some() {
                tracing::info!(filler = %template.id, "Filler already cached");
                outcomes.push(FillerOutcome {
                    id: template.id.clone(),
                    text: template.text.clone(),
                    status: "exists",
                    error: None,
                });
                continue;
            }

            let result = async {
                let outcome = self
                    .fallback
                    .synthesize(&template.text, voice_id, "tts-1")
                    .await?;
                self.cache
                    .store(&template.text, voice_id, &outcome.audio, "mp3")
                    .await
                    .map_err(|e| anyhow::anyhow!(e))?;
                Ok::<(), anyhow::Error>(())
            }
            .await;

            match result {
                Ok(()) => {
                    tracing::info!(filler = %template.id, "Generated filler");
                    outcomes.push(FillerOutcome {
                        id: template.id.clone(),
                        text: template.text.clone(),
                        status: "generated",
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::error!(filler = %template.id, error = %e, "Failed to generate filler");
                    outcomes.push(FillerOutcome {
                        id: template.id.clone(),
                        text: template.text.clone(),
                        status: "error",
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcomes
    }

    /// 各模板对指定音色的缓存状态
    pub fn list(&self, voice_id: &str) -> Vec<FillerStatus> {
        self.templates
            .iter()
            .map(|template| {
                let path = self.cache.peek(&template.text, voice_id);
                FillerStatus {
                    id: template.id.clone(),
                    text: template.text.clone(),
                    cached: path.is_some(),
                    audio_path: path,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::TtsProviderPort;
    use crate::config::FuzzyConfig;
    use crate::domain::normalizer::NormalizeConfig;
    use crate::infrastructure::adapters::tts::{FakeBehavior, FakeTtsProvider};
    use crate::infrastructure::memory::HotIndex;
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteCacheRepository,
    };
    use crate::infrastructure::storage::AudioStore;

    fn templates() -> Vec<FillerTemplate> {
        vec![
            FillerTemplate {
                id: "ack_wait".to_string(),
                text: "Bir dakika".to_string(),
            },
            FillerTemplate {
                id: "ack_searching".to_string(),
                text: "Bakıyorum".to_string(),
            },
        ]
    }

    async fn manager(provider: Arc<FakeTtsProvider>) -> (FillerManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let cache = Arc::new(CacheService::new(
            Arc::new(SqliteCacheRepository::new(pool)),
            Arc::new(HotIndex::new(1)),
            AudioStore::new(dir.path()).await.unwrap(),
            NormalizeConfig::default(),
            &FuzzyConfig::default(),
            1,
        ));
        let fallback = Arc::new(FallbackOrchestrator::new(vec![
            provider as Arc<dyn TtsProviderPort>
        ]));

        (FillerManager::new(cache, fallback, templates()), dir)
    }

    #[tokio::test]
    async fn test_generate_then_skip_cached() {
        let provider = Arc::new(FakeTtsProvider::with_audio("fake", b"audio".to_vec()));
        let (manager, _dir) = manager(provider.clone()).await;

        let outcomes = manager.generate("v1").await;
        assert!(outcomes.iter().all(|o| o.status == "generated"));
        assert_eq!(provider.call_count(), 2);

        // 第二次全部命中，不再触发上游
        let outcomes = manager.generate("v1").await;
        assert!(outcomes.iter().all(|o| o.status == "exists"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_generate_reports_errors() {
        let provider = Arc::new(FakeTtsProvider::new("fake", FakeBehavior::Timeout));
        let (manager, _dir) = manager(provider).await;

        let outcomes = manager.generate("v1").await;
        assert!(outcomes.iter().all(|o| o.status == "error"));
        assert!(outcomes[0].error.is_some());
    }

    #[tokio::test]
    async fn test_list_reflects_cache_state() {
        let provider = Arc::new(FakeTtsProvider::with_audio("fake", b"audio".to_vec()));
        let (manager, _dir) = manager(provider).await;

        assert!(manager.list("v1").iter().all(|s| !s.cached));

        manager.generate("v1").await;

        let statuses = manager.list("v1");
        assert!(statuses.iter().all(|s| s.cached && s.audio_path.is_some()));
        // 其他音色不受影响
        assert!(manager.list("v2").iter().all(|s| !s.cached));
    }
}
