//! Sled 持久化实现

mod audio_cache;

pub use audio_cache::{SledAudioCache, SledCacheConfig};
