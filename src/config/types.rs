//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 推理引擎配置
    #[serde(default)]
    pub engine: EngineConfig,

    /// 模型生命周期配置
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// 音色目录配置
    #[serde(default)]
    pub voices: VoicesConfig,

    /// 音频输出配置
    #[serde(default)]
    pub audio: AudioConfig,

    /// 一次性合成缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
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
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8880
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// 推理引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// 推理服务基础 URL
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// 单次合成请求超时（秒）
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,

    /// 模型加载超时（秒）
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
}

fn default_engine_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_engine_timeout() -> u64 {
    120
}

fn default_load_timeout() -> u64 {
    600
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            timeout_secs: default_engine_timeout(),
            load_timeout_secs: default_load_timeout(),
        }
    }
}

/// 模型生命周期配置
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// 空闲卸载窗口（秒），<= 0 表示常驻不卸载
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: i64,
}

fn default_keep_alive() -> i64 {
    300
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive(),
        }
    }
}

/// 音色目录配置
#[derive(Debug, Clone, Deserialize)]
pub struct VoicesConfig {
    /// 音色资源目录
    #[serde(default = "default_voices_dir")]
    pub dir: PathBuf,

    /// 请求未指定音色时的默认值
    #[serde(default = "default_voice")]
    pub default_voice: String,
}

fn default_voices_dir() -> PathBuf {
    PathBuf::from("voices")
}

fn default_voice() -> String {
    "nature".to_string()
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            dir: default_voices_dir(),
            default_voice: default_voice(),
        }
    }
}

/// 音频输出配置
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// 输出采样率（Hz）
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// 引擎侧单块样本数上限
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,

    /// 默认输出格式: wav | opus | pcm
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Opus 目标比特率 (bps)
    #[serde(default = "default_opus_bitrate")]
    pub opus_bitrate: u32,
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_chunk_samples() -> usize {
    8192
}

fn default_output_format() -> String {
    "wav".to_string()
}

fn default_opus_bitrate() -> u32 {
    32000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            chunk_samples: default_chunk_samples(),
            output_format: default_output_format(),
            opus_bitrate: default_opus_bitrate(),
        }
    }
}

/// 一次性合成缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 是否启用
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// sled 数据库路径
    #[serde(default = "default_cache_path")]
    pub path: String,

    /// 最大缓存大小（字节）
    #[serde(default = "default_cache_max_size")]
    pub max_size_bytes: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_path() -> String {
    "data/cache.sled".to_string()
}

fn default_cache_max_size() -> u64 {
    1024 * 1024 * 1024 // 1GB
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: default_cache_path(),
            max_size_bytes: default_cache_max_size(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别（tracing EnvFilter 语法）
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8880);
        assert_eq!(config.lifecycle.keep_alive_secs, 300);
        assert_eq!(config.audio.sample_rate, 24000);
        assert_eq!(config.voices.default_voice, "nature");
        assert!(config.cache.enabled);
    }
}
