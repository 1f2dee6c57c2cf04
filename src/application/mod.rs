//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（VoiceStore、TtsEngine、AudioEncoder、AudioCache）
//! - session: 流式合成会话
//! - speech: 语音合成服务（一次性 + 流式入口）
//! - error: 应用层错误定义

pub mod error;
pub mod ports;
pub mod session;
pub mod speech;

pub use error::SpeechError;
pub use session::{SegmentStats, StreamingSession};
pub use speech::{AudioOptions, SpeechService, SynthesisSummary};

pub use ports::{
    // Audio cache
    generate_cache_key,
    AudioCachePort,
    CacheError,
    CacheMetadata,
    CacheStats,
    // Audio encoder
    AudioEncoderPort,
    AudioFormat,
    EncodeError,
    // TTS engine
    EngineError,
    RawChunkReceiver,
    SpeechModel,
    SynthesisRequest,
    TtsEnginePort,
    // Voice store
    VoiceError,
    VoiceInfo,
    VoiceKind,
    VoiceRef,
    VoiceStorePort,
};
