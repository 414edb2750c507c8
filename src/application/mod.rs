//! Application Layer
//!
//! 端口定义与组合服务

pub mod cache_service;
pub mod evictor;
pub mod fallback;
pub mod fillers;
pub mod ports;
pub mod reconciler;
pub mod speech_service;

pub use cache_service::{CacheError, CacheHit, CacheService, MatchType, StoredEntry};
pub use evictor::{Evictor, EvictorConfig};
pub use fallback::{has_credentials, FallbackError, FallbackOrchestrator, SynthesisOutcome};
pub use fillers::{FillerManager, FillerOutcome, FillerStatus};
pub use reconciler::{load_hot_index, ReconcileReport, Reconciler};
pub use speech_service::{SpeechError, SpeechRequest, SpeechResponse, SpeechService};
