//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::normalizer::NormalizeConfig;

/// 应用主配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 上游 TTS 提供方配置
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// 填充语音配置
    #[serde(default)]
    pub fillers: FillerConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8844
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 是否启用缓存
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// 数据目录（包含 cache.db 与 audio/）
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// 条目数上限，超出后按 hit_count 最低淘汰
    #[serde(default = "default_max_entries")]
    pub max_entries: i64,

    /// 条目最小保留天数，超龄即为淘汰候选
    #[serde(default = "default_min_age_days")]
    pub min_age_days: i64,

    /// 每个 (text, voice) 的最大变体数
    #[serde(default = "default_variety_depth")]
    pub variety_depth: usize,

    /// 超过该长度的文本不进缓存（字符数）
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// 淘汰任务运行间隔（小时）
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_hours: u64,

    /// 模糊匹配配置
    #[serde(default)]
    pub fuzzy: FuzzyConfig,

    /// 文本规范化配置
    #[serde(default)]
    pub normalize: NormalizeConfig,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_entries() -> i64 {
    50_000
}

fn default_min_age_days() -> i64 {
    7
}

fn default_variety_depth() -> usize {
    1
}

fn default_max_text_length() -> usize {
    500
}

fn default_cleanup_interval() -> u64 {
    1
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            data_dir: default_data_dir(),
            max_entries: default_max_entries(),
            min_age_days: default_min_age_days(),
            variety_depth: default_variety_depth(),
            max_text_length: default_max_text_length(),
            cleanup_interval_hours: default_cleanup_interval(),
            fuzzy: FuzzyConfig::default(),
            normalize: NormalizeConfig::default(),
        }
    }
}

impl CacheConfig {
    /// SQLite 元数据文件路径
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    /// 音频文件目录
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    /// 填充语音子目录（Reconciler 不触碰）
    pub fn fillers_dir(&self) -> PathBuf {
        self.audio_dir().join("fillers")
    }
}

/// 模糊匹配配置
///
/// 默认关闭：规范化已覆盖大小写与变音符号，精确匹配通常足够
#[derive(Debug, Clone, Deserialize)]
pub struct FuzzyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// 命中阈值（0..100）
    #[serde(default = "default_fuzzy_threshold")]
    pub threshold: u8,

    /// 打分器名称（ratio / partial_ratio / token_sort_ratio / token_set_ratio）
    #[serde(default = "default_fuzzy_scorer")]
    pub scorer: String,
}

fn default_fuzzy_threshold() -> u8 {
    90
}

fn default_fuzzy_scorer() -> String {
    "token_sort_ratio".to_string()
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_fuzzy_threshold(),
            scorer: default_fuzzy_scorer(),
        }
    }
}

/// 上游提供方集合配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProvidersConfig {
    /// 降级链（按优先级排序的提供方名称）
    #[serde(default)]
    pub fallback_chain: Vec<String>,

    /// 各提供方配置
    #[serde(default)]
    pub configs: HashMap<String, ProviderConfig>,

    /// 通用音色名 -> 各提供方音色名映射
    #[serde(default)]
    pub voice_mapping: HashMap<String, HashMap<String, String>>,

    /// 通用模型名 -> 各提供方模型名映射
    #[serde(default)]
    pub model_mapping: HashMap<String, HashMap<String, String>>,
}

/// 提供方接入类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI 兼容 API（OpenAI / MiniMax / GateAI 等）
    #[default]
    OpenAi,
    /// ElevenLabs API
    ElevenLabs,
    /// 固定音频（测试与离线环境）
    Fake,
}

/// 单个提供方配置
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub default_voice: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_provider_timeout")]
    pub timeout_s: u64,
}

fn default_model() -> String {
    "tts-1".to_string()
}

fn default_provider_timeout() -> u64 {
    15
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: String::new(),
            api_key: String::new(),
            default_voice: String::new(),
            default_model: default_model(),
            timeout_s: default_provider_timeout(),
        }
    }
}

/// 填充语音模板
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct FillerTemplate {
    pub id: String,
    pub text: String,
}

/// 填充语音配置
#[derive(Debug, Clone, Deserialize)]
pub struct FillerConfig {
    /// 启动时自动生成填充语音
    #[serde(default)]
    pub auto_generate_on_startup: bool,

    /// 生成填充语音使用的音色
    #[serde(default)]
    pub voice_id: String,

    #[serde(default = "default_filler_templates")]
    pub templates: Vec<FillerTemplate>,
}

fn default_filler_templates() -> Vec<FillerTemplate> {
    [
        ("ack_listening", "Evet, dinliyorum"),
        ("ack_thinking", "Hmm, bir saniye"),
        ("ack_searching", "Bakıyorum"),
        ("ack_found", "Buldum, bir saniye"),
        ("ack_analyzing", "Analiz ediyorum"),
        ("ack_summarizing", "Özetliyorum"),
        ("ack_started", "Hemen bakıyorum"),
        ("ack_wait", "Bir dakika"),
    ]
    .into_iter()
    .map(|(id, text)| FillerTemplate {
        id: id.to_string(),
        text: text.to_string(),
    })
    .collect()
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            auto_generate_on_startup: false,
            voice_id: String::new(),
            templates: default_filler_templates(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8844);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.variety_depth, 1);
        assert!(!config.cache.fuzzy.enabled);
        assert_eq!(config.cache.fuzzy.threshold, 90);
    }

    #[test]
    fn test_server_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:8844");
    }

    #[test]
    fn test_cache_paths() {
        let config = CacheConfig::default();
        assert_eq!(config.db_path(), PathBuf::from("./data/cache.db"));
        assert_eq!(config.audio_dir(), PathBuf::from("./data/audio"));
        assert_eq!(config.fillers_dir(), PathBuf::from("./data/audio/fillers"));
    }

    #[test]
    fn test_default_filler_templates() {
        let config = FillerConfig::default();
        assert_eq!(config.templates.len(), 8);
        assert_eq!(config.templates[0].id, "ack_listening");
    }
}
