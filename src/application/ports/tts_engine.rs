//! TTS Engine Port - 推理引擎抽象
//!
//! 引擎负责加载昂贵的模型资源并对文本片段做流式合成。
//! 合成是阻塞且可能耗时数秒的操作，实现方必须把它放在请求分发路径之外执行。

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::voice_store::VoiceRef;

/// 引擎错误
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Engine network error: {0}")]
    Network(String),

    #[error("Engine request timeout")]
    Timeout,
}

/// 一次片段合成请求
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// 要合成的文本片段
    pub text: String,
    /// 会话绑定的音色资源
    pub voice: VoiceRef,
    /// 语速倍率
    pub speed: f32,
    /// 输出采样率（Hz）
    pub sample_rate: u32,
    /// 每个原始块的样本数上限
    pub chunk_samples: usize,
}

/// 原始音频块通道的容量
///
/// 有界通道：消费方跟不上时合成侧挂起，绝不丢弃 PCM
pub const RAW_CHUNK_CAPACITY: usize = 8;

/// 原始音频块接收端
///
/// 有限、单遍、不可重放的块序列；调用方必须完整读完一个片段的块，
/// 才能开始下一个片段。提前 drop 接收端即为取消。
pub type RawChunkReceiver = mpsc::Receiver<Result<Vec<f32>, EngineError>>;

/// 已加载的模型句柄
///
/// 由 ModelManager 独占持有；被逐出或进程退出时随 Arc 释放
#[async_trait]
pub trait SpeechModel: Send + Sync + std::fmt::Debug {
    /// 流式合成一个文本片段
    ///
    /// 返回原始 f32 样本块（归一化幅度，1.0 == 满幅）的接收端
    async fn synthesize(&self, request: SynthesisRequest) -> Result<RawChunkReceiver, EngineError>;
}

/// TTS Engine Port
#[async_trait]
pub trait TtsEnginePort: Send + Sync {
    /// 加载模型（昂贵操作，可能耗时数秒）
    async fn load(&self) -> Result<Arc<dyn SpeechModel>, EngineError>;

    /// 检查引擎是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
