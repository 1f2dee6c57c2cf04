//! Murmur - 流式语音合成服务
//!
//! - Domain: 边界切分 + 增益棘轮
//! - Application: SpeechService / StreamingSession / ports
//! - Infrastructure: http, memory, persistence, adapters

use std::sync::Arc;

use murmur::application::{AudioCachePort, AudioFormat, AudioOptions, SpeechService};
use murmur::config::{load_config, print_config};
use murmur::infrastructure::adapters::{FsVoiceStore, HttpTtsEngine, HttpTtsEngineConfig, PcmEncoder};
use murmur::infrastructure::http::{AppState, HttpServer, ServerConfig};
use murmur::infrastructure::memory::{ModelManager, SessionRegistry};
use murmur::infrastructure::persistence::sled::{SledAudioCache, SledCacheConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!(
        "{},murmur={},tower_http=debug",
        config.log.level, config.log.level
    );
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));
    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    tracing::info!("Murmur - streaming speech synthesis service");
    print_config(&config);

    // 确保音色目录存在
    tokio::fs::create_dir_all(&config.voices.dir).await?;

    // 音色目录
    let voice_store = Arc::new(FsVoiceStore::new(&config.voices.dir));

    // 推理引擎客户端
    let engine_config = HttpTtsEngineConfig {
        base_url: config.engine.url.clone(),
        timeout_secs: config.engine.timeout_secs,
        load_timeout_secs: config.engine.load_timeout_secs,
    };
    let engine = Arc::new(HttpTtsEngine::new(engine_config)?);

    // 模型生命周期管理器
    let manager = ModelManager::new(engine.clone(), config.lifecycle.keep_alive_secs);

    // 一次性合成缓存（可关闭）
    let sled_cache = if config.cache.enabled {
        if let Some(parent) = std::path::Path::new(&config.cache.path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let cache_config = SledCacheConfig {
            db_path: config.cache.path.clone(),
            max_size_bytes: config.cache.max_size_bytes,
        };
        Some(SledAudioCache::new(&cache_config)?.arc())
    } else {
        None
    };
    let cache: Option<Arc<dyn AudioCachePort>> = sled_cache
        .clone()
        .map(|c| c as Arc<dyn AudioCachePort>);

    // 容器编码器与会话登记表
    let encoder = Arc::new(PcmEncoder::new(config.audio.opus_bitrate));
    let registry = Arc::new(SessionRegistry::new());

    let speech = Arc::new(SpeechService::new(
        voice_store,
        manager.clone(),
        encoder,
        cache.clone(),
        registry,
        AudioOptions {
            sample_rate: config.audio.sample_rate,
            chunk_samples: config.audio.chunk_samples,
        },
    ));

    // 默认输出格式在配置验证阶段已确认可解析
    let default_format: AudioFormat = config
        .audio
        .output_format
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid output format: {}", e))?;

    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let state = AppState::new(
        speech,
        manager.clone(),
        engine,
        cache,
        config.voices.default_voice.clone(),
        default_format,
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

    // 释放模型句柄并撤销挂起的逐出定时器
    manager.shutdown().await;

    // 把缓存落盘
    if let Some(cache) = &sled_cache {
        if let Err(e) = cache.flush() {
            tracing::warn!(error = %e, "Cache flush on shutdown failed");
        }
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}
