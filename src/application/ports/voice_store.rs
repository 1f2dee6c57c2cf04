//! Voice Store Port - 音色目录抽象
//!
//! 把音色 ID 解析为其资源包：参考音频 + 转写文本（声音克隆后端），
//! 或独立的已训练模型文件（自带音色的后端）。具体实现在 infrastructure/adapters 层。

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// 音色解析错误
///
/// 资源文件部分缺失视为解析失败，而不是降级可用
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Voice not found: {0}")]
    NotFound(String),

    #[error("Voice '{0}' is missing its reference transcript")]
    MissingTranscript(String),

    #[error("Invalid voice id: {0}")]
    InvalidId(String),

    #[error("Invalid reference audio for voice '{voice}': {reason}")]
    InvalidReferenceAudio { voice: String, reason: String },

    #[error("Voice store I/O error: {0}")]
    Io(String),
}

/// 音色的资源类型
#[derive(Debug, Clone)]
pub enum VoiceKind {
    /// 参考音频 + 转写文本（克隆后端要求两者同时存在）
    ReferencePair {
        audio_path: PathBuf,
        transcript: String,
    },
    /// 独立的已训练模型文件
    TrainedModel { model_path: PathBuf },
}

impl VoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReferencePair { .. } => "reference",
            Self::TrainedModel { .. } => "model",
        }
    }
}

/// 已解析的音色引用
///
/// 只有全部伴生资源存在时才能构造出来
#[derive(Debug, Clone)]
pub struct VoiceRef {
    pub id: String,
    pub kind: VoiceKind,
}

/// 音色列表条目
#[derive(Debug, Clone, Serialize)]
pub struct VoiceInfo {
    pub id: String,
    pub kind: &'static str,
}

/// Voice Store Port
#[async_trait]
pub trait VoiceStorePort: Send + Sync {
    /// 解析音色 ID 为完整的资源引用
    async fn resolve(&self, voice_id: &str) -> Result<VoiceRef, VoiceError>;

    /// 列出所有可解析的音色
    async fn list(&self) -> Result<Vec<VoiceInfo>, VoiceError>;
}
