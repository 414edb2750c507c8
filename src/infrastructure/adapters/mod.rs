//! Adapters - 外部系统适配器

pub mod transcoder;
pub mod tts;

pub use transcoder::FfmpegTranscoder;
pub use tts::{ElevenLabsProvider, FakeTtsProvider, OpenAiCompatProvider};
