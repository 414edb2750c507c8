//! Application Ports
//!
//! 端口定义，具体实现在 infrastructure 层

mod repository;
mod transcoder;
mod tts_provider;

pub use repository::{
    CacheEntryRecord, CacheRepositoryPort, CacheStats, EvictionCandidate, NewCacheEntry,
    RepositoryError, VoiceStats,
};
pub use transcoder::{AudioFormat, AudioTranscoderPort, TranscodeError};
pub use tts_provider::{ProviderError, SynthesisRequest, TtsProviderPort};
