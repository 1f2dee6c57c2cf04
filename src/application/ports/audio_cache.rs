//! Audio Cache Port - 单次合成结果缓存抽象
//!
//! 缓存非流式请求的编码后输出，键为文本/音色/语速/格式的内容哈希

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// 缓存错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// 缓存条目元数据
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    pub voice_id: String,
    pub format: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

/// 缓存统计
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// 生成缓存 key
///
/// 同样的文本 + 音色 + 语速 + 格式 命中同一条目
pub fn generate_cache_key(text: &str, voice_id: &str, speed: f32, format: &str) -> String {
    let digest = md5::compute(format!("{}|{}|{}|{}", text, voice_id, speed, format));
    format!("{:x}", digest)
}

/// Audio Cache Port
#[async_trait]
pub trait AudioCachePort: Send + Sync {
    /// 写入编码后的音频
    async fn put(
        &self,
        cache_key: &str,
        audio_data: Vec<u8>,
        metadata: CacheMetadata,
    ) -> Result<(), CacheError>;

    /// 读取缓存音频（命中时更新 LRU）
    async fn get(&self, cache_key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// 缓存统计快照
    async fn stats(&self) -> CacheStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_deterministic() {
        let a = generate_cache_key("hello", "nature", 1.0, "wav");
        let b = generate_cache_key("hello", "nature", 1.0, "wav");
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_varies_by_inputs() {
        let base = generate_cache_key("hello", "nature", 1.0, "wav");
        assert_ne!(base, generate_cache_key("hello!", "nature", 1.0, "wav"));
        assert_ne!(base, generate_cache_key("hello", "calm", 1.0, "wav"));
        assert_ne!(base, generate_cache_key("hello", "nature", 1.5, "wav"));
        assert_ne!(base, generate_cache_key("hello", "nature", 1.0, "opus"));
    }
}
