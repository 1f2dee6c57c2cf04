//! Sled-based LRU Audio Cache Implementation
//!
//! 缓存一次性合成的编码输出。key 是请求内容哈希，value 为
//! bincode 序列化的条目；超出容量上限时按 last_accessed 淘汰。

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{AudioCachePort, CacheError, CacheMetadata, CacheStats};

const KEY_PREFIX: &str = "speech:";

/// Sled 缓存配置
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// 数据库路径
    pub db_path: String,
    /// 最大缓存大小（字节）
    pub max_size_bytes: u64,
}

impl Default for SledCacheConfig {
    fn default() -> Self {
        Self {
            db_path: "data/cache.sled".to_string(),
            max_size_bytes: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// 内部缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalCacheEntry {
    audio_data: Vec<u8>,
    size_bytes: u64,
    duration_ms: u64,
    voice_id: String,
    format: String,
    sample_rate: u32,
    /// 毫秒时间戳，LRU 按此排序
    last_accessed: i64,
    created_at: i64,
}

/// Sled 音频缓存
pub struct SledAudioCache {
    db: Db,
    max_size_bytes: u64,
    current_size: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl SledAudioCache {
    pub fn new(config: &SledCacheConfig) -> Result<Self, CacheError> {
        let db = sled::open(&config.db_path).map_err(|e| CacheError::Database(e.to_string()))?;

        let current_size = Self::calculate_total_size(&db)?;
        tracing::info!(
            db_path = %config.db_path,
            max_size_bytes = config.max_size_bytes,
            current_size,
            "SledAudioCache initialized"
        );

        Ok(Self {
            db,
            max_size_bytes: config.max_size_bytes,
            current_size: AtomicU64::new(current_size),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, max_size_bytes: u64) -> Result<Self, CacheError> {
        Self::new(&SledCacheConfig {
            db_path: path.as_ref().to_string_lossy().to_string(),
            max_size_bytes,
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 启动时重算占用
    fn calculate_total_size(db: &Db) -> Result<u64, CacheError> {
        let mut total = 0u64;
        for item in db.scan_prefix(KEY_PREFIX) {
            let (_, value) = item.map_err(|e| CacheError::Database(e.to_string()))?;
            if let Ok(entry) = bincode::deserialize::<InternalCacheEntry>(&value) {
                total += entry.size_bytes;
            }
        }
        Ok(total)
    }

    /// 淘汰最久未访问的条目；空库返回 false
    fn evict_lru(&self) -> Result<bool, CacheError> {
        let mut oldest: Option<(Vec<u8>, InternalCacheEntry)> = None;

        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (key, value) = item.map_err(|e| CacheError::Database(e.to_string()))?;
            if let Ok(entry) = bincode::deserialize::<InternalCacheEntry>(&value) {
                let is_older = oldest
                    .as_ref()
                    .map(|(_, e)| entry.last_accessed < e.last_accessed)
                    .unwrap_or(true);
                if is_older {
                    oldest = Some((key.to_vec(), entry));
                }
            }
        }

        let Some((key, entry)) = oldest else {
            return Ok(false);
        };

        self.db
            .remove(&key)
            .map_err(|e| CacheError::Database(e.to_string()))?;
        self.current_size
            .fetch_sub(entry.size_bytes, Ordering::Relaxed);
        tracing::debug!(
            key = %String::from_utf8_lossy(&key),
            size_bytes = entry.size_bytes,
            "LRU evicted cache entry"
        );
        Ok(true)
    }

    pub fn flush(&self) -> Result<(), CacheError> {
        self.db
            .flush()
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AudioCachePort for SledAudioCache {
    async fn put(
        &self,
        cache_key: &str,
        audio_data: Vec<u8>,
        metadata: CacheMetadata,
    ) -> Result<(), CacheError> {
        let size = audio_data.len() as u64;
        if size > self.max_size_bytes {
            tracing::warn!(size, max = self.max_size_bytes, "Entry exceeds cache limit, skipping");
            return Ok(());
        }

        while self.current_size.load(Ordering::Relaxed) + size > self.max_size_bytes {
            if !self.evict_lru()? {
                break;
            }
        }

        let now = Utc::now().timestamp_millis();
        let entry = InternalCacheEntry {
            audio_data,
            size_bytes: size,
            duration_ms: metadata.duration_ms,
            voice_id: metadata.voice_id,
            format: metadata.format,
            sample_rate: metadata.sample_rate,
            last_accessed: now,
            created_at: now,
        };
        let entry_bytes =
            bincode::serialize(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let previous = self
            .db
            .insert(format!("{}{}", KEY_PREFIX, cache_key), entry_bytes)
            .map_err(|e| CacheError::Database(e.to_string()))?;

        // 覆盖写要先扣掉旧条目的占用
        if let Some(old) = previous {
            if let Ok(old_entry) = bincode::deserialize::<InternalCacheEntry>(&old) {
                self.current_size
                    .fetch_sub(old_entry.size_bytes, Ordering::Relaxed);
            }
        }
        self.current_size.fetch_add(size, Ordering::Relaxed);

        Ok(())
    }

    async fn get(&self, cache_key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let key = format!("{}{}", KEY_PREFIX, cache_key);
        let Some(value) = self
            .db
            .get(&key)
            .map_err(|e| CacheError::Database(e.to_string()))?
        else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let mut entry: InternalCacheEntry =
            bincode::deserialize(&value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        // 命中刷新访问时间
        entry.last_accessed = Utc::now().timestamp_millis();
        if let Ok(updated) = bincode::serialize(&entry) {
            let _ = self.db.insert(&key, updated);
        }

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry.audio_data))
    }

    async fn stats(&self) -> CacheStats {
        let total_entries = self.db.scan_prefix(KEY_PREFIX).count();
        CacheStats {
            total_entries,
            total_size_bytes: self.current_size.load(Ordering::Relaxed),
            max_size_bytes: self.max_size_bytes,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}
