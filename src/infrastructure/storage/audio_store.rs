//! Audio Store - 音频文件存储
//!
//! 文件名由 (规范文本, 音色, 版本) 确定性派生，并发写同键只会互相覆盖
//! 相同内容。写入协议：临时文件 + 原子改名，改名成功后调用方才写 DB 行。
//! 先文件后 DB 的顺序保证崩溃后只会留下孤儿文件（Reconciler 可回收），
//! 不会留下指向缺失文件的 DB 行

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// 存储错误
#[derive(Debug, Error)]
pub enum AudioStoreError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

/// 文件系统音频存储
pub struct AudioStore {
    /// 存储根目录
    audio_dir: PathBuf,
}

impl AudioStore {
    /// 创建存储，确保目录存在
    pub async fn new(audio_dir: impl AsRef<Path>) -> Result<Self, AudioStoreError> {
        let audio_dir = audio_dir.as_ref().to_path_buf();

        fs::create_dir_all(&audio_dir)
            .await
            .map_err(|e| AudioStoreError::IoError(e.to_string()))?;

        Ok(Self { audio_dir })
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// 确定性文件名派生
    ///
    /// v1 的键是 `{text}|{voice}`，v2 起追加 `|v{n}`，
    /// 保证老 v1 文件的哈希不变。摘要取完整 md5 十六进制
    pub fn derive_path(
        &self,
        text_normalized: &str,
        voice_id: &str,
        format: &str,
        version_num: i64,
    ) -> PathBuf {
        let key = if version_num <= 1 {
            format!("{}|{}", text_normalized, voice_id)
        } else {
            format!("{}|{}|v{}", text_normalized, voice_id, version_num)
        };
        let digest = md5::compute(key.as_bytes());
        self.audio_dir.join(format!("{:x}.{}", digest, format))
    }

    /// 原子写入：同目录临时文件 + rename
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<(), AudioStoreError> {
        let tmp = self.audio_dir.join(format!(".{}.tmp", Uuid::new_v4()));

        fs::write(&tmp, data)
            .await
            .map_err(|e| AudioStoreError::IoError(e.to_string()))?;

        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(AudioStoreError::IoError(e.to_string()));
        }

        tracing::debug!(path = %path.display(), size = data.len(), "Saved audio");
        Ok(())
    }

    /// 读取音频文件
    pub async fn read(&self, path: &Path) -> Result<Vec<u8>, AudioStoreError> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                AudioStoreError::FileNotFound(path.to_string_lossy().to_string()),
            ),
            Err(e) => Err(AudioStoreError::IoError(e.to_string())),
        }
    }

    /// 删除文件，不存在不算错误
    pub async fn delete(&self, path: &Path) -> Result<(), AudioStoreError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AudioStoreError::IoError(e.to_string())),
        }
    }
}
