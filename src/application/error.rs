//! 应用层错误定义
//!
//! 语音合成用例的统一错误分类：
//! - VoiceResolution: 音色资源缺失或不完整，请求/会话不会开始
//! - Load: 模型加载失败，状态回到 Unloaded，后续调用可重试
//! - Synthesis: 片段合成失败，终止所属会话，不影响其他会话与生命周期管理器
//! - Encode: 容器编码失败（仅非流式路径）
//! - Cancelled: 传输端断开触发的取消，不算合成失败

use thiserror::Error;

use super::ports::{EncodeError, EngineError, VoiceError};

/// 语音合成错误
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Voice resolution failed: {0}")]
    VoiceResolution(#[from] VoiceError),

    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session cancelled by transport")]
    Cancelled,
}

impl From<EngineError> for SpeechError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Load(msg) => Self::Load(msg),
            other => Self::Synthesis(other.to_string()),
        }
    }
}
