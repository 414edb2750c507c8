//! SQLite Cache Repository
//!
//! 唯一事实来源。并发插入通过 INSERT OR IGNORE + 唯一键回查汇合，
//! 不使用任何文件级锁

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use super::DbPool;
use crate::application::ports::{
    CacheEntryRecord, CacheRepositoryPort, CacheStats, EvictionCandidate, NewCacheEntry,
    RepositoryError, VoiceStats,
};

/// SQLite Cache Repository
pub struct SqliteCacheRepository {
    pool: DbPool,
    /// 进程内未命中计数，重启清零
    total_misses: AtomicU64,
}

impl SqliteCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            total_misses: AtomicU64::new(0),
        }
    }
}

#[derive(FromRow)]
struct EntryRow {
    id: i64,
    text_normalized: String,
    voice_id: String,
    version_num: i64,
    audio_path: String,
    format: String,
    size_bytes: i64,
    created_at: String,
    hit_count: i64,
}

impl TryFrom<EntryRow> for CacheEntryRecord {
    type Error = RepositoryError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(CacheEntryRecord {
            id: row.id,
            text_normalized: row.text_normalized,
            voice_id: row.voice_id,
            version_num: row.version_num,
            audio_path: row.audio_path,
            format: row.format,
            size_bytes: row.size_bytes,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?
                .with_timezone(&Utc),
            hit_count: row.hit_count,
        })
    }
}

#[async_trait]
impl CacheRepositoryPort for SqliteCacheRepository {
    async fn add_entry(&self, entry: NewCacheEntry) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO cache_entries
                (text_normalized, voice_id, version_num, audio_path, format, size_bytes, created_at, hit_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&entry.text_normalized)
        .bind(&entry.voice_id)
        .bind(entry.version_num)
        .bind(&entry.audio_path)
        .bind(&entry.format)
        .bind(entry.size_bytes)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        if result.rows_affected() > 0 {
            return Ok(result.last_insert_rowid());
        }

        // 唯一键竞争落败，查回已有行
        let id: i64 = sqlx::query_scalar(
            "SELECT id FROM cache_entries WHERE text_normalized = ? AND voice_id = ? AND version_num = ?",
        )
        .bind(&entry.text_normalized)
        .bind(&entry.voice_id)
        .bind(entry.version_num)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(id)
    }

    async fn record_hit(
        &self,
        text_normalized: &str,
        voice_id: &str,
        version_num: Option<i64>,
    ) -> Result<u64, RepositoryError> {
        let result = match version_num {
            Some(version) => sqlx::query(
                "UPDATE cache_entries SET hit_count = hit_count + 1
                 WHERE text_normalized = ? AND voice_id = ? AND version_num = ?",
            )
            .bind(text_normalized)
            .bind(voice_id)
            .bind(version)
            .execute(&self.pool)
            .await,
            None => sqlx::query(
                "UPDATE cache_entries SET hit_count = hit_count + 1
                 WHERE text_normalized = ? AND voice_id = ?",
            )
            .bind(text_normalized)
            .bind(voice_id)
            .execute(&self.pool)
            .await,
        }
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        // rows_affected == 0: 行刚被淘汰，静默 no-op
        Ok(result.rows_affected())
    }

    fn record_miss(&self) {
        self.total_misses.fetch_add(1, Ordering::Relaxed);
    }

    async fn get_version_count(
        &self,
        text_normalized: &str,
        voice_id: &str,
    ) -> Result<i64, RepositoryError> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM cache_entries WHERE text_normalized = ? AND voice_id = ?",
        )
        .bind(text_normalized)
        .bind(voice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))
    }

    async fn get_eviction_candidates(
        &self,
        max_entries: i64,
        min_age: chrono::Duration,
    ) -> Result<Vec<EvictionCandidate>, RepositoryError> {
        let cutoff = (Utc::now() - min_age).to_rfc3339();

        let age_rows = sqlx::query(
            "SELECT id, audio_path, text_normalized, voice_id FROM cache_entries
             WHERE created_at < ? ORDER BY created_at ASC",
        )
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let mut candidates: Vec<EvictionCandidate> = age_rows
            .iter()
            .map(|row| EvictionCandidate {
                id: row.get("id"),
                audio_path: row.get("audio_path"),
                text_normalized: row.get("text_normalized"),
                voice_id: row.get("voice_id"),
            })
            .collect();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        // 扣除超龄候选后仍超出上限时，补充 hit_count 最低的溢出候选
        let overflow = total - candidates.len() as i64 - max_entries;
        if overflow > 0 {
            let seen: HashSet<i64> = candidates.iter().map(|c| c.id).collect();
            let rows = sqlx::query(
                "SELECT id, audio_path, text_normalized, voice_id FROM cache_entries
                 ORDER BY hit_count ASC, id ASC LIMIT ?",
            )
            .bind(overflow + candidates.len() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

            let mut needed = overflow as usize;
            for row in rows {
                if needed == 0 {
                    break;
                }
                let id: i64 = row.get("id");
                if seen.contains(&id) {
                    continue;
                }
                candidates.push(EvictionCandidate {
                    id,
                    audio_path: row.get("audio_path"),
                    text_normalized: row.get("text_normalized"),
                    voice_id: row.get("voice_id"),
                });
                needed -= 1;
            }
        }

        Ok(candidates)
    }

    async fn delete_entries_by_ids(&self, ids: &[i64]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM cache_entries WHERE id IN ({})", placeholders);

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn get_all_entries_with_ids(&self) -> Result<Vec<CacheEntryRecord>, RepositoryError> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT id, text_normalized, voice_id, version_num, audio_path, format,
                    size_bytes, created_at, hit_count
             FROM cache_entries ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(CacheEntryRecord::try_from).collect()
    }

    async fn delete_all(&self) -> Result<Vec<String>, RepositoryError> {
        let paths: Vec<String> = sqlx::query_scalar("SELECT audio_path FROM cache_entries")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(paths)
    }

    async fn get_stats(&self) -> Result<CacheStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) as total_entries,
                    COALESCE(SUM(hit_count), 0) as total_hits,
                    MIN(created_at) as oldest
             FROM cache_entries",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let total_entries: i64 = row.get("total_entries");
        let total_hits: i64 = row.get("total_hits");
        let oldest: Option<String> = row.get("oldest");

        let total_misses = self.total_misses.load(Ordering::Relaxed);

        let denominator = total_hits as f64 + total_misses as f64;
        let hit_rate = if denominator > 0.0 {
            (total_hits as f64 / denominator * 10_000.0).round() / 10_000.0
        } else {
            0.0
        };

        let cache_age_seconds = oldest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| (Utc::now() - t.with_timezone(&Utc)).num_seconds())
            .unwrap_or(0);

        let voice_rows = sqlx::query(
            "SELECT voice_id,
                    COUNT(*) as entries,
                    COALESCE(SUM(hit_count), 0) as hits,
                    COALESCE(SUM(size_bytes), 0) as size_bytes
             FROM cache_entries GROUP BY voice_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let per_voice: HashMap<String, VoiceStats> = voice_rows
            .iter()
            .map(|row| {
                (
                    row.get::<String, _>("voice_id"),
                    VoiceStats {
                        entries: row.get("entries"),
                        hits: row.get("hits"),
                        size_bytes: row.get("size_bytes"),
                    },
                )
            })
            .collect();

        Ok(CacheStats {
            total_entries,
            total_hits,
            total_misses,
            hit_rate,
            cache_age_seconds,
            per_voice,
        })
    }
}
