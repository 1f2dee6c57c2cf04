//! Murmur - 流式语音合成服务
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - 文本边界切分（TextAccumulator）
//! - 增益棘轮归一化（GainRatchet）
//!
//! 应用层 (application/):
//! - Ports: 端口定义（VoiceStore, TtsEngine, AudioEncoder, AudioCache）
//! - SpeechService: 一次性合成与流式会话编排
//! - StreamingSession: 片段级串行合成
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: OpenAI 兼容 API + WebSocket 流式会话
//! - Memory: ModelManager（模型生命周期）, SessionRegistry
//! - Persistence: Sled 一次性合成缓存
//! - Adapters: FsVoiceStore, HttpTtsEngine, PcmEncoder

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
