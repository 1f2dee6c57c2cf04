//! Audio Encoder Port - 音频容器编码抽象
//!
//! 把完成的单声道 PCM 编码为响应容器格式。只作用于非流式输出；
//! 流式路径始终输出裸 s16le PCM。

use serde::Deserialize;
use thiserror::Error;

/// 编码错误
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Unsupported output format: {0}")]
    Unsupported(String),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Opus,
    /// 裸 s16le PCM，无容器
    Pcm,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::Wav
    }
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Opus => "opus",
            Self::Pcm => "pcm",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Opus => "audio/opus",
            Self::Pcm => "audio/pcm",
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wav" => Ok(Self::Wav),
            "opus" => Ok(Self::Opus),
            "pcm" => Ok(Self::Pcm),
            other => Err(EncodeError::Unsupported(other.to_string())),
        }
    }
}

/// Audio Encoder Port
pub trait AudioEncoderPort: Send + Sync {
    /// 将单声道 s16 PCM 编码为目标格式
    fn encode(
        &self,
        samples: &[i16],
        sample_rate: u32,
        format: AudioFormat,
    ) -> Result<Vec<u8>, EncodeError>;
}
