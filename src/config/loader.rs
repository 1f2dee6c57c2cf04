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

use crate::application::ports::AudioFormat;

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
/// 1. 环境变量（前缀 `MURMUR_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `MURMUR_SERVER__PORT=8880`
/// - `MURMUR_ENGINE__URL=http://inference:8000`
/// - `MURMUR_LIFECYCLE__KEEP_ALIVE_SECS=300`
/// - `MURMUR_VOICES__DIR=/data/voices`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8880)?
        .set_default("engine.url", "http://localhost:8000")?
        .set_default("engine.timeout_secs", 120)?
        .set_default("engine.load_timeout_secs", 600)?
        .set_default("lifecycle.keep_alive_secs", 300)?
        .set_default("voices.dir", "voices")?
        .set_default("voices.default_voice", "nature")?
        .set_default("audio.sample_rate", 24000)?
        .set_default("audio.chunk_samples", 8192)?
        .set_default("audio.output_format", "wav")?
        .set_default("audio.opus_bitrate", 32000)?
        .set_default("cache.enabled", true)?
        .set_default("cache.path", "data/cache.sled")?
        .set_default("cache.max_size_bytes", 1024_u64 * 1024 * 1024)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 前缀: MURMUR_，层级分隔符: __ (双下划线)
    builder = builder.add_source(
        Environment::with_prefix("MURMUR")
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

    if config.engine.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Engine URL cannot be empty".to_string(),
        ));
    }

    config
        .audio
        .output_format
        .parse::<AudioFormat>()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    // Opus 原生采样率之外无法提供 opus 输出
    if !matches!(
        config.audio.sample_rate,
        8000 | 12000 | 16000 | 24000 | 48000
    ) {
        return Err(ConfigError::ValidationError(format!(
            "Unsupported sample rate: {}",
            config.audio.sample_rate
        )));
    }

    if config.audio.chunk_samples == 0 {
        return Err(ConfigError::ValidationError(
            "audio.chunk_samples cannot be 0".to_string(),
        ));
    }

    if config.cache.enabled && config.cache.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Cache path cannot be empty when cache is enabled".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    tracing::info!("Engine URL: {}", config.engine.url);
    tracing::info!("Engine Timeout: {}s", config.engine.timeout_secs);
    if config.lifecycle.keep_alive_secs > 0 {
        tracing::info!("Model Keep-Alive: {}s", config.lifecycle.keep_alive_secs);
    } else {
        tracing::info!("Model Keep-Alive: disabled (model stays resident)");
    }
    tracing::info!("Voices Directory: {:?}", config.voices.dir);
    tracing::info!("Default Voice: {}", config.voices.default_voice);
    tracing::info!(
        "Audio: {} Hz, default format {}",
        config.audio.sample_rate,
        config.audio.output_format
    );
    tracing::info!("Cache Enabled: {}", config.cache.enabled);
    if config.cache.enabled {
        tracing::info!("Cache Path: {}", config.cache.path);
        tracing::info!("Cache Max Size: {} bytes", config.cache.max_size_bytes);
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8880);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_engine_url() {
        let mut config = AppConfig::default();
        config.engine.url = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_unknown_format() {
        let mut config = AppConfig::default();
        config.audio.output_format = "mp3".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_odd_sample_rate() {
        let mut config = AppConfig::default();
        config.audio.sample_rate = 22050;
        assert!(validate_config(&config).is_err());
    }
}
