//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_cache;
mod audio_encoder;
mod tts_engine;
mod voice_store;

pub use audio_cache::{
    generate_cache_key, AudioCachePort, CacheError, CacheMetadata, CacheStats,
};
pub use audio_encoder::{AudioEncoderPort, AudioFormat, EncodeError};
pub use tts_engine::{
    EngineError, RawChunkReceiver, SpeechModel, SynthesisRequest, TtsEnginePort,
    RAW_CHUNK_CAPACITY,
};
pub use voice_store::{VoiceError, VoiceInfo, VoiceKind, VoiceRef, VoiceStorePort};
