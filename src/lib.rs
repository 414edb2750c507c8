//! CacheVoice - TTS 缓存反向代理
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Normalizer: 缓存键文本规范化
//! - Scorer: 模糊匹配打分器注册表
//!
//! 应用层 (application/):
//! - Ports: 端口定义（CacheRepository, TtsProvider, AudioTranscoder）
//! - CacheService: 三级缓存门面（热索引 + 音频文件 + SQLite 元数据）
//! - FallbackOrchestrator: 上游 TTS 提供方降级链
//! - SpeechService: 请求管线（命中分类 + 后台变体预热）
//! - Evictor / Reconciler: 缓存淘汰与启动一致性校验
//! - FillerManager: 填充语音池
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: OpenAI 兼容 RESTful API
//! - Memory: 热索引、预热任务去重集合
//! - Storage: 音频文件原子写入
//! - Persistence: SQLite 元数据存储
//! - Adapters: 上游 TTS 客户端、ffmpeg 转码

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
