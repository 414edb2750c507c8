//! Application State
//!
//! 启动时构建一次，经 Arc 注入各 handler；
//! 测试按用例独立构建实例

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::{CacheService, FallbackOrchestrator, FillerManager, SpeechService};
use crate::application::ports::CacheRepositoryPort;

/// 应用状态
pub struct AppState {
    pub speech: Arc<SpeechService>,
    pub cache: Arc<CacheService>,
    pub repo: Arc<dyn CacheRepositoryPort>,
    pub fallback: Arc<FallbackOrchestrator>,
    pub fillers: Arc<FillerManager>,
    /// `<audio_dir>/fillers/`，静态填充音频
    pub fillers_dir: PathBuf,
}

impl AppState {
    pub fn new(
        speech: Arc<SpeechService>,
        cache: Arc<CacheService>,
        repo: Arc<dyn CacheRepositoryPort>,
        fallback: Arc<FallbackOrchestrator>,
        fillers: Arc<FillerManager>,
        fillers_dir: PathBuf,
    ) -> Self {
        Self {
            speech,
            cache,
            repo,
            fallback,
            fillers,
            fillers_dir,
        }
    }
}
