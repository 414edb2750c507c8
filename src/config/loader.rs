//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `CACHEVOICE_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `CACHEVOICE_SERVER__PORT=8080`
/// - `CACHEVOICE_CACHE__DATA_DIR=/data`
/// - `CACHEVOICE_CACHE__VARIETY_DEPTH=3`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8844)?
        .set_default("server.log_level", "info")?
        .set_default("cache.enabled", true)?
        .set_default("cache.data_dir", "./data")?
        .set_default("cache.max_entries", 50_000)?
        .set_default("cache.min_age_days", 7)?
        .set_default("cache.variety_depth", 1)?
        .set_default("cache.max_text_length", 500)?
        .set_default("cache.cleanup_interval_hours", 1)?
        .set_default("cache.fuzzy.enabled", false)?
        .set_default("cache.fuzzy.threshold", 90)?
        .set_default("cache.fuzzy.scorer", "token_sort_ratio")?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 前缀: CACHEVOICE_
    // 层级分隔符: __ (双下划线)
    builder = builder.add_source(
        Environment::with_prefix("CACHEVOICE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if config.cache.variety_depth == 0 {
        return Err(ConfigError::ValidationError(
            "cache.variety_depth must be at least 1".to_string(),
        ));
    }

    if config.cache.fuzzy.threshold > 100 {
        return Err(ConfigError::ValidationError(
            "cache.fuzzy.threshold must be in 0..100".to_string(),
        ));
    }

    if config.cache.enabled && config.cache.cleanup_interval_hours == 0 {
        return Err(ConfigError::ValidationError(
            "cache.cleanup_interval_hours cannot be 0 when caching is enabled".to_string(),
        ));
    }

    for name in &config.providers.fallback_chain {
        if !config.providers.configs.contains_key(name) {
            tracing::warn!(
                provider = %name,
                "Provider referenced in fallback_chain but missing from providers.configs"
            );
        }
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    tracing::info!("Cache Enabled: {}", config.cache.enabled);
    tracing::info!("Data Directory: {:?}", config.cache.data_dir);
    tracing::info!("Max Entries: {}", config.cache.max_entries);
    tracing::info!("Variety Depth: {}", config.cache.variety_depth);
    tracing::info!("Fuzzy Matching: {}", config.cache.fuzzy.enabled);
    tracing::info!(
        "Fallback Chain: [{}]",
        config.providers.fallback_chain.join(", ")
    );
    tracing::info!("Log Level: {}", config.server.log_level);
    tracing::info!("=================================");
}
