//! Integrity Reconciler - 启动一致性校验
//!
//! 启动期单次运行，在热索引装载之后、HTTP 监听之前：
//! - Phase 1 (DB -> FS)：音频文件缺失的 DB 行删除，并摘除热索引条目
//! - Phase 2 (FS -> DB)：音频目录顶层未被任何 DB 行引用的常规文件删除。
//!   不递归，fillers/ 子目录原样保留

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::application::ports::{CacheRepositoryPort, RepositoryError};
use crate::infrastructure::memory::HotIndex;

/// 校验结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub orphan_entries: usize,
    pub orphan_files: usize,
}

/// 启动一致性校验器
pub struct Reconciler {
    repo: Arc<dyn CacheRepositoryPort>,
    hot: Arc<HotIndex>,
    audio_dir: PathBuf,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn CacheRepositoryPort>,
        hot: Arc<HotIndex>,
        audio_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            repo,
            hot,
            audio_dir: audio_dir.as_ref().to_path_buf(),
        }
    }

    pub async fn run(&self) -> Result<ReconcileReport, RepositoryError> {
        let entries = self.repo.get_all_entries_with_ids().await?;

        // Phase 1: DB -> FS
        let mut orphan_ids = Vec::new();
        let mut referenced: HashSet<PathBuf> = HashSet::new();

        for entry in &entries {
            let path = Path::new(&entry.audio_path);
            if tokio::fs::metadata(path).await.is_ok() {
                referenced.insert(resolve(path).await);
            } else {
                orphan_ids.push(entry.id);
                self.hot.remove(&entry.text_normalized, &entry.voice_id);
            }
        }

        if !orphan_ids.is_empty() {
            self.repo.delete_entries_by_ids(&orphan_ids).await?;
        }

        // Phase 2: FS -> DB，只扫顶层
        let mut orphan_files = 0;
        match tokio::fs::read_dir(&self.audio_dir).await {
            Ok(mut dir) => loop {
                let entry = match dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read audio directory entry");
                        break;
                    }
                };

                let is_file = entry
                    .file_type()
                    .await
                    .map(|t| t.is_file())
                    .unwrap_or(false);
                if !is_file {
                    continue;
                }

                let path = entry.path();
                if referenced.contains(&resolve(&path).await) {
                    continue;
                }

                match tokio::fs::remove_file(&path).await {
                    Ok(()) => orphan_files += 1,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to delete orphan file")
                    }
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read audio directory, skipping orphan file sweep")
            }
        }

        tracing::info!(
            "Startup: removed {} orphan DB entries, {} orphan files",
            orphan_ids.len(),
            orphan_files
        );

        Ok(ReconcileReport {
            orphan_entries: orphan_ids.len(),
            orphan_files,
        })
    }
}

/// 规范化路径用于比较；无法解析时用原值
async fn resolve(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

/// 启动时从 DB 装载热索引
///
/// 文件缺失的条目跳过并记日志，随后 Reconciler 会把它们从 DB 删掉
pub async fn load_hot_index(
    repo: &Arc<dyn CacheRepositoryPort>,
    hot: &HotIndex,
) -> Result<usize, RepositoryError> {
    let entries = repo.get_all_entries_with_ids().await?;
    let mut loaded = 0;

    for entry in &entries {
        if tokio::fs::metadata(&entry.audio_path).await.is_err() {
            tracing::warn!(
                path = %entry.audio_path,
                voice_id = %entry.voice_id,
                "Skipping cache entry with missing audio file"
            );
            continue;
        }
        hot.add(&entry.text_normalized, &entry.voice_id, &entry.audio_path);
        loaded += 1;
    }

    tracing::info!(loaded = loaded, "Loaded cache entries into hot index");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::NewCacheEntry;
    use crate::infrastructure::persistence::sqlite::{
        create_pool, run_migrations, DatabaseConfig, SqliteCacheRepository,
    };

    async fn setup() -> (
        Arc<dyn CacheRepositoryPort>,
        Arc<HotIndex>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (
            Arc::new(SqliteCacheRepository::new(pool)),
            Arc::new(HotIndex::new(1)),
            dir,
        )
    }

    async fn add_entry(
        repo: &Arc<dyn CacheRepositoryPort>,
        text: &str,
        path: &Path,
    ) {
        repo.add_entry(NewCacheEntry {
            text_normalized: text.to_string(),
            voice_id: "v1".to_string(),
            version_num: 1,
            audio_path: path.to_string_lossy().to_string(),
            format: "mp3".to_string(),
            size_bytes: 5,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_orphan_db_entry_removed() {
        let (repo, hot, dir) = setup().await;

        // 文件被手工删掉的行
        add_entry(&repo, "ghost", &dir.path().join("ghost.mp3")).await;
        hot.add("ghost", "v1", &dir.path().join("ghost.mp3").to_string_lossy());

        // 完好的行
        let alive = dir.path().join("alive.mp3");
        tokio::fs::write(&alive, b"audio").await.unwrap();
        add_entry(&repo, "alive", &alive).await;

        let reconciler = Reconciler::new(repo.clone(), hot.clone(), dir.path());
        let report = reconciler.run().await.unwrap();

        assert_eq!(report.orphan_entries, 1);
        assert_eq!(report.orphan_files, 0);
        assert!(hot.exact_lookup("ghost", "v1").is_none());

        let remaining = repo.get_all_entries_with_ids().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text_normalized, "alive");
    }

    #[tokio::test]
    async fn test_orphan_file_removed_fillers_preserved() {
        let (repo, hot, dir) = setup().await;

        let referenced = dir.path().join("referenced.mp3");
        tokio::fs::write(&referenced, b"audio").await.unwrap();
        add_entry(&repo, "referenced", &referenced).await;

        let orphan = dir.path().join("orphan.mp3");
        tokio::fs::write(&orphan, b"stray").await.unwrap();

        // fillers/ 子目录由填充子系统管理，不能动
        let fillers = dir.path().join("fillers");
        tokio::fs::create_dir_all(&fillers).await.unwrap();
        let filler_file = fillers.join("ack_wait.mp3");
        tokio::fs::write(&filler_file, b"filler").await.unwrap();

        let reconciler = Reconciler::new(repo.clone(), hot, dir.path());
        let report = reconciler.run().await.unwrap();

        assert_eq!(report.orphan_entries, 0);
        assert_eq!(report.orphan_files, 1);
        assert!(referenced.exists());
        assert!(!orphan.exists());
        assert!(filler_file.exists());
    }

    #[tokio::test]
    async fn test_clean_state_reports_zero() {
        let (repo, hot, dir) = setup().await;
        let reconciler = Reconciler::new(repo, hot, dir.path());
        assert_eq!(reconciler.run().await.unwrap(), ReconcileReport::default());
    }

    #[tokio::test]
    async fn test_load_hot_index_skips_missing_files() {
        let (repo, hot, dir) = setup().await;

        let alive = dir.path().join("alive.mp3");
        tokio::fs::write(&alive, b"audio").await.unwrap();
        add_entry(&repo, "alive", &alive).await;
        add_entry(&repo, "ghost", &dir.path().join("ghost.mp3")).await;

        let loaded = load_hot_index(&repo, &hot).await.unwrap();
        assert_eq!(loaded, 1);
        assert!(hot.exact_lookup("alive", "v1").is_some());
        assert!(hot.exact_lookup("ghost", "v1").is_none());
    }
}
