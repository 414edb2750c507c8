//! Transcoder Adapters - 音频转码实现

mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;
