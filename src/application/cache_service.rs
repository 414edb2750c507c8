//! Cache Service - 三级缓存门面
//!
//! 组合规范化、热索引、音频存储与元数据 DB，
//! 对外暴露 lookup / store 两个操作

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::application::ports::{CacheRepositoryPort, NewCacheEntry, RepositoryError};
use crate::domain::normalizer::{normalize, NormalizeConfig};
use crate::domain::scorer::{resolve_scorer, ScorerFn};
use crate::infrastructure::memory::HotIndex;
use crate::infrastructure::storage::{AudioStore, AudioStoreError};

/// 缓存门面错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Storage(#[from] AudioStoreError),
}

/// 命中类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Fuzzy,
}

impl MatchType {
    /// 结构化日志里的 reason_code
    pub fn reason_code(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact_hit",
            MatchType::Fuzzy => "fuzzy_hit",
        }
    }
}

/// 命中结果
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub match_type: MatchType,
    pub path: String,
    /// 命中条目的规范文本（模糊命中时不等于输入的规范文本）
    pub matched: String,
    pub score: u8,
}

/// store 的返回值
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub path: PathBuf,
    pub version_num: i64,
    pub text_normalized: String,
}

/// 模糊匹配参数
struct FuzzySettings {
    enabled: bool,
    threshold: u8,
    scorer: ScorerFn,
}

/// 三级缓存门面
pub struct CacheService {
    repo: Arc<dyn CacheRepositoryPort>,
    hot: Arc<HotIndex>,
    store: AudioStore,
    normalize_config: NormalizeConfig,
    fuzzy: FuzzySettings,
    variety_depth: i64,
}

impl CacheService {
    pub fn new(
        repo: Arc<dyn CacheRepositoryPort>,
        hot: Arc<HotIndex>,
        store: AudioStore,
        normalize_config: NormalizeConfig,
        fuzzy: &crate::config::FuzzyConfig,
        variety_depth: usize,
    ) -> Self {
        Self {
            repo,
            hot,
            store,
            normalize_config,
            fuzzy: FuzzySettings {
                enabled: fuzzy.enabled,
                threshold: fuzzy.threshold,
                scorer: resolve_scorer(&fuzzy.scorer),
            },
            variety_depth: variety_depth.max(1) as i64,
        }
    }

    /// 输入文本的规范形式
    pub fn normalize(&self, text: &str) -> String {
        normalize(text, &self.normalize_config)
    }

    /// 缓存查找
    ///
    /// 顺序：规范化 -> 热索引精确 -> 热索引模糊（若启用）-> miss。
    /// 命中对"命中条目"的规范文本记账（模糊命中时关键），
    /// miss 递增未命中计数
    pub async fn lookup(
        &self,
        text: &str,
        voice_id: &str,
    ) -> Result<Option<CacheHit>, CacheError> {
        let normalized = self.normalize(text);
        if normalized.is_empty() {
            self.repo.record_miss();
            return Ok(None);
        }

        if let Some(path) = self.hot.exact_lookup(&normalized, voice_id) {
            self.repo.record_hit(&normalized, voice_id, None).await?;
            return Ok(Some(CacheHit {
                match_type: MatchType::Exact,
                path,
                matched: normalized,
                score: 100,
            }));
        }

        if self.fuzzy.enabled {
            if let Some(hit) =
                self.hot
                    .fuzzy_lookup(&normalized, voice_id, self.fuzzy.threshold, self.fuzzy.scorer)
            {
                self.repo.record_hit(&hit.matched, voice_id, None).await?;
                return Ok(Some(CacheHit {
                    match_type: MatchType::Fuzzy,
                    path: hit.path,
                    matched: hit.matched,
                    score: hit.score,
                }));
            }
        }

        self.repo.record_miss();
        Ok(None)
    }

    /// 只探测热索引，不记账（填充语音生成判重用）
    pub fn peek(&self, text: &str, voice_id: &str) -> Option<String> {
        let normalized = self.normalize(text);
        if normalized.is_empty() {
            return None;
        }
        self.hot.exact_lookup(&normalized, voice_id)
    }

    /// 写入缓存
    ///
    /// 版本号派生 `min(现有版本数 + 1, variety_depth)`；文件先落盘
    /// （临时文件 + 原子改名），改名成功后才插入 DB 行。唯一键竞争
    /// 落败时 add_entry 返回已有行 id，文件名确定性派生保证路径一致
    pub async fn store(
        &self,
        text: &str,
        voice_id: &str,
        audio: &[u8],
        format: &str,
    ) -> Result<StoredEntry, CacheError> {
        let normalized = self.normalize(text);

        let existing = self.repo.get_version_count(&normalized, voice_id).await?;
        let version_num = (existing + 1).min(self.variety_depth);

        let path = self
            .store
            .derive_path(&normalized, voice_id, format, version_num);
        self.store.write(&path, audio).await?;

        let path_str = path.to_string_lossy().to_string();
        self.repo
            .add_entry(NewCacheEntry {
                text_normalized: normalized.clone(),
                voice_id: voice_id.to_string(),
                version_num,
                audio_path: path_str.clone(),
                format: format.to_string(),
                size_bytes: audio.len() as i64,
            })
            .await?;

        self.hot.add(&normalized, voice_id, &path_str);

        Ok(StoredEntry {
            path,
            version_num,
            text_normalized: normalized,
        })
    }

    /// 读取命中条目的音频文件
    pub async fn read_audio(&self, path: &str) -> Result<Vec<u8>, AudioStoreError> {
        self.store.read(std::path::Path::new(path)).await
    }

    /// (text_normalized, voice) 的现有版本数
    pub async fn version_count(
        &self,
        text_normalized: &str,
        voice_id: &str,
    ) -> Result<i64, CacheError> {
        Ok(self.repo.get_version_count(text_normalized, voice_id).await?)
    }

    /// 未命中记账（管线在不查缓存的路径上使用）
    pub fn record_miss(&self) {
        self.repo.record_miss();
    }

    /// 清空三级缓存，返回 (条目数, 删除文件数)
    pub async fn clear(&self) -> Result<(usize, usize), CacheError> {
        let paths = self.repo.delete_all().await?;
        self.hot.clear();

        let mut removed_files = 0;
        for path in &paths {
            if self.store.delete(std::path::Path::new(path)).await.is_ok() {
                removed_files += 1;
            }
        }

        Ok((paths.len(), removed_files))
    }

    pub fn hot(&self) -> &HotIndex {
        &self.hot
    }

    pub fn variety_depth(&self) -> i64 {
        self.variety_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FuzzyConfig;
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteCacheRepository,
    };
    use tempfile::TempDir;

    async fn service(variety_depth: usize, fuzzy_enabled: bool) -> (CacheService, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let repo = Arc::new(SqliteCacheRepository::new(pool));
        let hot = Arc::new(HotIndex::new(variety_depth));
        let store = AudioStore::new(temp_dir.path()).await.unwrap();

        let fuzzy = FuzzyConfig {
            enabled: fuzzy_enabled,
            threshold: 80,
            scorer: "token_sort_ratio".to_string(),
        };

        let service = CacheService::new(
            repo,
            hot,
            store,
            NormalizeConfig::default(),
            &fuzzy,
            variety_depth,
        );
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_store_then_lookup_exact_hit() {
        let (cache, _dir) = service(1, false).await;

        let stored = cache.store("Bakıyorum", "v1", b"fake_audio", "mp3").await.unwrap();
        assert_eq!(stored.version_num, 1);

        let hit = cache.lookup("Bakıyorum", "v1").await.unwrap().unwrap();
        assert_eq!(hit.match_type, MatchType::Exact);
        assert_eq!(hit.score, 100);
        assert_eq!(hit.path, stored.path.to_string_lossy());
        assert_eq!(cache.read_audio(&hit.path).await.unwrap(), b"fake_audio");
    }

    #[tokio::test]
    async fn test_lookup_miss() {
        let (cache, _dir) = service(1, false).await;
        let result = cache.lookup("tamamen farklı bir cümle", "v1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_normalization_parity() {
        let (cache, _dir) = service(1, false).await;
        cache.store("ARAŞTIRIYORUM", "v1", b"fake_audio", "mp3").await.unwrap();

        // 大小写、标点、数字差异都折叠到同一个键
        for input in ["araştırıyorum", "Araştırıyorum!", "araştırıyorum..."] {
            let hit = cache.lookup(input, "v1").await.unwrap().unwrap();
            assert_eq!(hit.match_type, MatchType::Exact);
        }

        cache.store("3 kaynak buldum", "v1", b"fake_audio", "mp3").await.unwrap();
        let hit = cache.lookup("5 kaynak buldum", "v1").await.unwrap().unwrap();
        assert_eq!(hit.match_type, MatchType::Exact);
    }

    #[tokio::test]
    async fn test_voices_do_not_share_entries() {
        let (cache, _dir) = service(1, false).await;
        cache.store("Hello, World!", "v1", b"audio-1", "mp3").await.unwrap();

        assert!(cache.lookup("Hello, World!", "v2").await.unwrap().is_none());

        cache.store("Hello, World!", "v2", b"audio-2", "mp3").await.unwrap();
        assert!(cache.lookup("Hello, World!", "v1").await.unwrap().is_some());
        assert!(cache.lookup("Hello, World!", "v2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fuzzy_hit_records_matched_entry() {
        let (cache, _dir) = service(1, true).await;
        cache.store("hemen bakiyorum tamam", "v1", b"audio", "mp3").await.unwrap();

        let hit = cache.lookup("bakiyorum hemen tamam", "v1").await.unwrap().unwrap();
        assert_eq!(hit.match_type, MatchType::Fuzzy);
        assert_eq!(hit.matched, "hemen bakiyorum tamam");

        // 命中计数落在被命中的条目上，而不是输入文本的键上
        let stats = cache.repo.get_stats().await.unwrap();
        assert_eq!(stats.total_hits, 1);
    }

    #[tokio::test]
    async fn test_version_capped_at_variety_depth() {
        let (cache, _dir) = service(2, false).await;

        let v1 = cache.store("merhaba", "v1", b"a", "mp3").await.unwrap();
        let v2 = cache.store("merhaba", "v1", b"b", "mp3").await.unwrap();
        let v3 = cache.store("merhaba", "v1", b"c", "mp3").await.unwrap();

        assert_eq!(v1.version_num, 1);
        assert_eq!(v2.version_num, 2);
        // 超出深度后钉在最后一个版本上（覆盖写，不再新增行）
        assert_eq!(v3.version_num, 2);
        assert_eq!(cache.version_count("merhaba", "v1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_peek_does_not_record() {
        let (cache, _dir) = service(1, false).await;
        cache.store("merhaba", "v1", b"audio", "mp3").await.unwrap();

        assert!(cache.peek("merhaba", "v1").is_some());
        assert!(cache.peek("yok", "v1").is_none());

        let stats = cache.repo.get_stats().await.unwrap();
        assert_eq!(stats.total_hits, 0);
        assert_eq!(stats.total_misses, 0);
    }

    #[tokio::test]
    async fn test_clear_empties_all_tiers() {
        let (cache, _dir) = service(1, false).await;
        let stored = cache.store("merhaba", "v1", b"audio", "mp3").await.unwrap();

        let (entries, files) = cache.clear().await.unwrap();
        assert_eq!(entries, 1);
        assert_eq!(files, 1);
        assert!(cache.lookup("merhaba", "v1").await.unwrap().is_none());
        assert!(!stored.path.exists());
    }
}
