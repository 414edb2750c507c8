//! SQLite Database - 数据库连接和迁移
//!
//! Schema v2:
//! - cache_entries: 缓存条目，唯一键 (text_normalized, voice_id, version_num)
//! - schema_version: 当前 schema 版本号
//!
//! v1（无 version_num 列）检测到时执行迁移：加列、按 (text, voice) 去重、建唯一索引

use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

use crate::application::ports::RepositoryError;

/// 当前 schema 版本
pub const SCHEMA_VERSION: i64 = 2;

/// 数据库配置
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    pub database_url: String,
    /// 最大连接数
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/cache.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite:{}?mode=rwc", path.as_ref().display()),
            max_connections: 5,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}

/// 数据库连接池
pub type DbPool = Pool<Sqlite>;

/// 创建数据库连接池
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    // 启用 WAL 模式，允许并发读写
    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

    // 设置 busy_timeout=5000ms，遇到锁时等待而不是立即失败
    sqlx::query("PRAGMA busy_timeout=5000")
        .execute(&pool)
        .await?;

    // 设置同步模式为 NORMAL（平衡性能和安全性）
    sqlx::query("PRAGMA synchronous=NORMAL")
        .execute(&pool)
        .await?;

    tracing::info!("SQLite pool created with WAL mode and busy_timeout=5000ms");

    Ok(pool)
}

/// 运行数据库迁移
///
/// 迁移失败在启动期是致命错误，由调用方上抛
pub async fn run_migrations(pool: &DbPool) -> Result<(), RepositoryError> {
    let fresh = !table_exists(pool, "cache_entries").await?;

    if fresh {
        create_schema_v2(pool).await?;
        tracing::info!("Database initialized at schema v{}", SCHEMA_VERSION);
        return Ok(());
    }

    let version = current_schema_version(pool).await?;
    if version < SCHEMA_VERSION {
        tracing::info!(from = version, to = SCHEMA_VERSION, "Migrating cache schema");
        migrate_v1_to_v2(pool).await?;
        tracing::info!("Schema migration completed");
    }

    Ok(())
}

async fn table_exists(pool: &DbPool, name: &str) -> Result<bool, RepositoryError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

    Ok(count > 0)
}

async fn column_exists(pool: &DbPool, table: &str, column: &str) -> Result<bool, RepositoryError> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

    Ok(rows
        .iter()
        .any(|row| row.get::<String, _>("name") == column))
}

/// schema_version 表缺失时视为 v1
async fn current_schema_version(pool: &DbPool) -> Result<i64, RepositoryError> {
    if !table_exists(pool, "schema_version").await? {
        return Ok(1);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

    Ok(version.unwrap_or(1))
}

async fn create_schema_v2(pool: &DbPool) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text_normalized TEXT NOT NULL,
            voice_id TEXT NOT NULL,
            version_num INTEGER NOT NULL DEFAULT 1,
            audio_path TEXT NOT NULL,
            format TEXT NOT NULL DEFAULT 'mp3',
            size_bytes INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            hit_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE (text_normalized, voice_id, version_num)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RepositoryError::MigrationError(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_cache_entries_voice
        ON cache_entries(voice_id)
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RepositoryError::MigrationError(e.to_string()))?;

    record_schema_version(pool).await
}

/// v1 -> v2 迁移
///
/// 幂等：加列前探测列是否已存在；去重保留 hit_count 最高的行，
/// 平局取 id 最小（确定性）
async fn migrate_v1_to_v2(pool: &DbPool) -> Result<(), RepositoryError> {
    if !column_exists(pool, "cache_entries", "version_num").await? {
        sqlx::query("ALTER TABLE cache_entries ADD COLUMN version_num INTEGER NOT NULL DEFAULT 1")
            .execute(pool)
            .await
            .map_err(|e| RepositoryError::MigrationError(e.to_string()))?;
    }

    let deduped = sqlx::query(
        r#"
        DELETE FROM cache_entries
        WHERE id NOT IN (
            SELECT (
                SELECT c2.id FROM cache_entries c2
                WHERE c2.text_normalized = c1.text_normalized
                  AND c2.voice_id = c1.voice_id
                ORDER BY c2.hit_count DESC, c2.id ASC
                LIMIT 1
            )
            FROM cache_entries c1
            GROUP BY c1.text_normalized, c1.voice_id
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RepositoryError::MigrationError(e.to_string()))?;

    if deduped.rows_affected() > 0 {
        tracing::info!(
            removed = deduped.rows_affected(),
            "Deduplicated legacy cache entries"
        );
    }

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_entries_unique
        ON cache_entries(text_normalized, voice_id, version_num)
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| RepositoryError::MigrationError(e.to_string()))?;

    record_schema_version(pool).await
}

async fn record_schema_version(pool: &DbPool) -> Result<(), RepositoryError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(pool)
        .await
        .map_err(|e| RepositoryError::MigrationError(e.to_string()))?;

    sqlx::query("DELETE FROM schema_version")
        .execute(pool)
        .await
        .map_err(|e| RepositoryError::MigrationError(e.to_string()))?;

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await
        .map_err(|e| RepositoryError::MigrationError(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> DbPool {
        create_pool(&DatabaseConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_gets_v2() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        assert_eq!(current_schema_version(&pool).await.unwrap(), SCHEMA_VERSION);
        assert!(column_exists(&pool, "cache_entries", "version_num")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert_eq!(current_schema_version(&pool).await.unwrap(), SCHEMA_VERSION);
    }

    /// 手工搭一个 v1 库（无 version_num、无唯一约束、有重复行），
    /// 验证迁移去重保留 hit_count 最高的行
    #[tokio::test]
    async fn test_v1_migration_dedupes_keeping_highest_hit_count() {
        let pool = memory_pool().await;

        sqlx::query(
            r#"
            CREATE TABLE cache_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text_normalized TEXT NOT NULL,
                voice_id TEXT NOT NULL,
                audio_path TEXT NOT NULL,
                format TEXT NOT NULL DEFAULT 'mp3',
                size_bytes INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        for (path, hits) in [("/a1.mp3", 2), ("/a2.mp3", 7), ("/a3.mp3", 7)] {
            sqlx::query(
                "INSERT INTO cache_entries (text_normalized, voice_id, audio_path, created_at, hit_count)
                 VALUES ('merhaba', 'v1', ?, '2024-01-01T00:00:00Z', ?)",
            )
            .bind(path)
            .bind(hits)
            .execute(&pool)
            .await
            .unwrap();
        }

        run_migrations(&pool).await.unwrap();

        let rows = sqlx::query("SELECT audio_path, hit_count, version_num FROM cache_entries")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        // hit_count 平局时保留 id 最小的行
        assert_eq!(rows[0].get::<String, _>("audio_path"), "/a2.mp3");
        assert_eq!(rows[0].get::<i64, _>("hit_count"), 7);
        assert_eq!(rows[0].get::<i64, _>("version_num"), 1);

        assert_eq!(current_schema_version(&pool).await.unwrap(), SCHEMA_VERSION);
    }
}
