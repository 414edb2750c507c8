//! CacheVoice - TTS 缓存反向代理
//!
//! 启动顺序：配置 -> 日志 -> 数据目录 -> SQLite 迁移 -> 热索引装载 ->
//! 一致性校验 -> 组件装配 -> 淘汰任务 -> HTTP 监听（优雅关闭）

use std::sync::Arc;
use std::time::Duration;

use cachevoice::application::ports::{AudioTranscoderPort, CacheRepositoryPort};
use cachevoice::application::speech_service::SpeechServiceConfig;
use cachevoice::application::{
    load_hot_index, CacheService, Evictor, EvictorConfig, FallbackOrchestrator, FillerManager,
    Reconciler, SpeechService,
};
use cachevoice::config::{load_config, print_config};
use cachevoice::infrastructure::adapters::FfmpegTranscoder;
use cachevoice::infrastructure::http::{AppState, HttpServer, ServerConfig};
use cachevoice::infrastructure::memory::{HotIndex, WarmupTracker};
use cachevoice::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteCacheRepository,
};
use cachevoice::infrastructure::storage::AudioStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!(
        "{},cachevoice={},tower_http=debug",
        config.server.log_level, config.server.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("CacheVoice - TTS caching reverse proxy");
    print_config(&config);

    // 确保数据目录存在
    tokio::fs::create_dir_all(&config.cache.data_dir).await?;
    tokio::fs::create_dir_all(config.cache.audio_dir()).await?;
    tokio::fs::create_dir_all(config.cache.fillers_dir()).await?;

    // 初始化数据库（迁移失败是致命错误）
    let pool = create_pool(&DatabaseConfig::new(config.cache.db_path())).await?;
    run_migrations(&pool).await?;

    let repo: Arc<dyn CacheRepositoryPort> = Arc::new(SqliteCacheRepository::new(pool));
    let hot = Arc::new(HotIndex::new(config.cache.variety_depth));

    // 热索引装载 + 启动一致性校验，都在接受流量之前
    load_hot_index(&repo, &hot).await?;
    let reconciler = Reconciler::new(repo.clone(), hot.clone(), config.cache.audio_dir());
    reconciler.run().await?;

    // 组件装配
    let audio_store = AudioStore::new(config.cache.audio_dir()).await?;
    let transcoder: Arc<dyn AudioTranscoderPort> = Arc::new(FfmpegTranscoder::new());
    let fallback = Arc::new(FallbackOrchestrator::from_config(&config.providers));

    let cache = Arc::new(CacheService::new(
        repo.clone(),
        hot.clone(),
        audio_store,
        config.cache.normalize.clone(),
        &config.cache.fuzzy,
        config.cache.variety_depth,
    ));

    let speech = Arc::new(SpeechService::new(
        cache.clone(),
        fallback.clone(),
        transcoder,
        Arc::new(WarmupTracker::new()),
        SpeechServiceConfig {
            cache_enabled: config.cache.enabled,
            max_text_length: config.cache.max_text_length,
            variety_depth: config.cache.variety_depth as i64,
        },
    ));

    let fillers = Arc::new(FillerManager::new(
        cache.clone(),
        fallback.clone(),
        config.fillers.templates.clone(),
    ));

    // 可选：启动时后台生成填充语音池
    if config.fillers.auto_generate_on_startup && !config.fillers.voice_id.is_empty() {
        let fillers = fillers.clone();
        let voice_id = config.fillers.voice_id.clone();
        tokio::spawn(async move {
            let outcomes = fillers.generate(&voice_id).await;
            let generated = outcomes.iter().filter(|o| o.status == "generated").count();
            tracing::info!(voice_id = %voice_id, generated = generated, "Startup filler generation finished");
        });
    }

    // 启动淘汰任务
    let evictor = Evictor::new(
        repo.clone(),
        hot.clone(),
        EvictorConfig {
            max_entries: config.cache.max_entries,
            min_age: chrono::Duration::days(config.cache.min_age_days),
            interval: Duration::from_secs(config.cache.cleanup_interval_hours * 3600),
        },
    );
    tokio::spawn(evictor.run());

    // 创建 HTTP 服务器
    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let state = AppState::new(
        speech,
        cache,
        repo,
        fallback,
        fillers,
        config.cache.fillers_dir(),
    );

    let server = HttpServer::new(server_config, state);

    tracing::info!("Starting HTTP server...");

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
