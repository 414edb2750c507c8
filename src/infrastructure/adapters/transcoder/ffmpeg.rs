//! Ffmpeg Transcoder - 基于 ffmpeg 子进程的格式转换
//!
//! 实现 AudioTranscoderPort trait。输入/输出走临时文件，
//! 子进程限时 30 秒。ffmpeg 缺失不致命，管线会回落到源格式

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::application::ports::{AudioTranscoderPort, TranscodeError};

const FFMPEG_TIMEOUT: Duration = Duration::from_secs(30);

/// ffmpeg 子进程转码器
pub struct FfmpegTranscoder {
    ffmpeg_bin: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
        }
    }

    /// 指定可执行文件路径（测试用）
    pub fn with_binary(ffmpeg_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }

    /// 各目标格式的编码参数
    fn codec_args(dst_format: &str) -> Result<Vec<&'static str>, TranscodeError> {
        match dst_format {
            // OGG Opus 容器，语音场景参数
            "opus" => Ok(vec![
                "-c:a",
                "libopus",
                "-b:a",
                "64k",
                "-ar",
                "48000",
                "-ac",
                "1",
                "-application",
                "voip",
                "-f",
                "ogg",
            ]),
            // OGG Vorbis
            "ogg" => Ok(vec!["-c:a", "libvorbis", "-q:a", "4", "-f", "ogg"]),
            "wav" => Ok(vec!["-f", "wav"]),
            "mp3" => Ok(vec!["-c:a", "libmp3lame", "-f", "mp3"]),
            other => Err(TranscodeError::Unsupported(other.to_string())),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioTranscoderPort for FfmpegTranscoder {
    async fn convert(
        &self,
        audio: &[u8],
        src_format: &str,
        dst_format: &str,
    ) -> Result<Vec<u8>, TranscodeError> {
        if src_format == dst_format {
            return Ok(audio.to_vec());
        }

        let codec_args = Self::codec_args(dst_format)?;

        let work_dir = tempfile::tempdir().map_err(|e| TranscodeError::IoError(e.to_string()))?;
        let input_path = work_dir.path().join(format!("input.{}", src_format));
        let output_path = work_dir.path().join(format!("output.{}", dst_format));

        tokio::fs::write(&input_path, audio)
            .await
            .map_err(|e| TranscodeError::IoError(e.to_string()))?;

        let mut command = Command::new(&self.ffmpeg_bin);
        command
            .arg("-y")
            .arg("-i")
            .arg(&input_path)
            .args(&codec_args)
            .arg(&output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TranscodeError::FfmpegNotFound
            } else {
                TranscodeError::IoError(e.to_string())
            }
        })?;

        let status = tokio::time::timeout(FFMPEG_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| TranscodeError::Timeout)?
            .map_err(|e| TranscodeError::IoError(e.to_string()))?
            .status;

        if !status.success() {
            return Err(TranscodeError::FfmpegFailed(status.code().unwrap_or(-1)));
        }

        tokio::fs::read(&output_path)
            .await
            .map_err(|e| TranscodeError::IoError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_format_is_passthrough() {
        let transcoder = FfmpegTranscoder::new();
        let out = transcoder.convert(b"bytes", "mp3", "mp3").await.unwrap();
        assert_eq!(out, b"bytes");
    }

    #[tokio::test]
    async fn test_unsupported_target_format() {
        let transcoder = FfmpegTranscoder::new();
        let err = transcoder.convert(b"bytes", "mp3", "flac").await.unwrap_err();
        assert!(matches!(err, TranscodeError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_maps_to_not_found() {
        let transcoder = FfmpegTranscoder::with_binary("/nonexistent/ffmpeg");
        let err = transcoder.convert(b"bytes", "mp3", "wav").await.unwrap_err();
        assert!(matches!(err, TranscodeError::FfmpegNotFound));
    }
}
