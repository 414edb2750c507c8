//! Audio Transcoder Port - 音频格式转换抽象

use async_trait::async_trait;
use thiserror::Error;

/// 支持的音频格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Ogg,
    Opus,
}

impl AudioFormat {
    /// 从格式标签解析，未知格式返回 None（HTTP 层映射为 400）
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "mp3" => Some(AudioFormat::Mp3),
            "wav" => Some(AudioFormat::Wav),
            "ogg" => Some(AudioFormat::Ogg),
            "opus" => Some(AudioFormat::Opus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
        }
    }

    /// HTTP Content-Type
    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            // opus 装在 OGG 容器里
            AudioFormat::Ogg | AudioFormat::Opus => "audio/ogg",
        }
    }
}

/// 转码错误
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Unsupported target format: {0}")]
    Unsupported(String),

    #[error("ffmpeg not found")]
    FfmpegNotFound,

    #[error("ffmpeg exited with status {0}")]
    FfmpegFailed(i32),

    #[error("Conversion timed out")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(String),
}

/// Audio Transcoder Port
///
/// 纯转换：输入字节 + 源/目标格式标签 -> 输出字节
#[async_trait]
pub trait AudioTranscoderPort: Send + Sync {
    async fn convert(
        &self,
        audio: &[u8],
        src_format: &str,
        dst_format: &str,
    ) -> Result<Vec<u8>, TranscodeError>;
}
