//! Evictor - 缓存淘汰
//!
//! 定时任务：超龄与容量溢出候选按"热索引 -> 文件 -> DB 行"的顺序
//! 删除。先摘热索引，避免 DB 删除与文件删除之间的查找拿到幽灵路径

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{CacheRepositoryPort, RepositoryError};
use crate::infrastructure::memory::HotIndex;

/// 淘汰配置
#[derive(Debug, Clone)]
pub struct EvictorConfig {
    pub max_entries: i64,
    pub min_age: chrono::Duration,
    /// 两次运行之间的间隔
    pub interval: Duration,
}

/// 缓存淘汰器
pub struct Evictor {
    repo: Arc<dyn CacheRepositoryPort>,
    hot: Arc<HotIndex>,
    config: EvictorConfig,
}

impl Evictor {
    pub fn new(
        repo: Arc<dyn CacheRepositoryPort>,
        hot: Arc<HotIndex>,
        config: EvictorConfig,
    ) -> Self {
        Self { repo, hot, config }
    }

    /// 周期运行（启动时 spawn）
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            max_entries = self.config.max_entries,
            "Evictor started"
        );

        let mut interval = tokio::time::interval(self.config.interval);
        // 第一个 tick 立即返回，跳过以免启动即清理
        interval.tick().await;

        loop {
            interval.tick().await;
            match self.run_once().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed = removed, "Periodic eviction completed"),
                Err(e) => tracing::error!(error = %e, "Periodic eviction failed"),
            }
        }
    }

    /// 单次淘汰
    pub async fn run_once(&self) -> Result<usize, RepositoryError> {
        let candidates = self
            .repo
            .get_eviction_candidates(self.config.max_entries, self.config.min_age)
            .await?;

        if candidates.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            self.hot
                .remove(&candidate.text_normalized, &candidate.voice_id);

            // 文件缺失不算错误
            match tokio::fs::remove_file(&candidate.audio_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %candidate.audio_path, error = %e, "Failed to delete audio file")
                }
            }

            ids.push(candidate.id);
        }

        self.repo.delete_entries_by_ids(&ids).await?;

        tracing::info!(removed = ids.len(), "Evicted cache entries");
        Ok(ids.len())
    }
}
