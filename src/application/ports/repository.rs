//! Cache Repository Port - 缓存元数据存储抽象
//!
//! SQLite 是唯一事实来源；并发插入通过唯一键约束汇合，
//! 除 DB 自身锁以外不引入文件级锁

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Schema migration failed: {0}")]
    MigrationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// 持久化的缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntryRecord {
    pub id: i64,
    pub text_normalized: String,
    pub voice_id: String,
    pub version_num: i64,
    pub audio_path: String,
    pub format: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub hit_count: i64,
}

/// 新条目插入参数
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub text_normalized: String,
    pub voice_id: String,
    pub version_num: i64,
    pub audio_path: String,
    pub format: String,
    pub size_bytes: i64,
}

/// 淘汰候选行
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub id: i64,
    pub audio_path: String,
    pub text_normalized: String,
    pub voice_id: String,
}

/// 按音色聚合的统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct VoiceStats {
    pub entries: i64,
    pub hits: i64,
    pub size_bytes: i64,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_entries: i64,
    pub total_hits: i64,
    pub total_misses: u64,
    /// total_hits / (total_hits + total_misses)，保留 4 位小数
    pub hit_rate: f64,
    /// now - min(created_at)
    pub cache_age_seconds: i64,
    pub per_voice: HashMap<String, VoiceStats>,
}

/// Cache Repository Port
#[async_trait]
pub trait CacheRepositoryPort: Send + Sync {
    /// 插入条目
    ///
    /// 唯一键 (text_normalized, voice_id, version_num) 上 INSERT OR IGNORE；
    /// 竞争落败时查回已有行的 id。永不报 duplicate
    async fn add_entry(&self, entry: NewCacheEntry) -> Result<i64, RepositoryError>;

    /// 命中计数 +1
    ///
    /// `version_num` 为 None 时递增该 (text, voice) 的所有版本（legacy 语义），
    /// 否则只递增指定版本。行已被淘汰时为 no-op，返回受影响行数
    async fn record_hit(
        &self,
        text_normalized: &str,
        voice_id: &str,
        version_num: Option<i64>,
    ) -> Result<u64, RepositoryError>;

    /// 未命中计数 +1（进程内计数器，重启清零）
    fn record_miss(&self);

    /// (text, voice) 现有版本数
    async fn get_version_count(
        &self,
        text_normalized: &str,
        voice_id: &str,
    ) -> Result<i64, RepositoryError>;

    /// 淘汰候选：超龄行，加上超出 max_entries 上限时 hit_count 最低的溢出行
    async fn get_eviction_candidates(
        &self,
        max_entries: i64,
        min_age: chrono::Duration,
    ) -> Result<Vec<EvictionCandidate>, RepositoryError>;

    /// 批量删除
    async fn delete_entries_by_ids(&self, ids: &[i64]) -> Result<u64, RepositoryError>;

    /// 全表扫描（Reconciler 与热索引装载使用）
    async fn get_all_entries_with_ids(&self) -> Result<Vec<CacheEntryRecord>, RepositoryError>;

    /// 清空全表，返回被删除行的音频路径
    async fn delete_all(&self) -> Result<Vec<String>, RepositoryError>;

    /// 聚合统计
    async fn get_stats(&self) -> Result<CacheStats, RepositoryError>;
}
