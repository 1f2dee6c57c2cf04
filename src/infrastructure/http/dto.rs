//! Data Transfer Objects

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::VoiceInfo;
use crate::domain::BoundaryMode;
use crate::infrastructure::memory::ModelStatus;

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 JSON 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Speech DTOs (OpenAI 兼容)
// ============================================================================

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    /// 兼容 OpenAI 客户端的字段，本服务忽略
    #[serde(default)]
    #[allow(dead_code)]
    pub model: Option<String>,
    /// 要合成的文本
    pub input: String,
    /// 音色 ID，缺省取配置默认值
    #[serde(default)]
    pub voice: Option<String>,
    /// 语速倍率
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// 输出格式: wav | opus | pcm
    #[serde(default)]
    pub response_format: Option<String>,
    /// true 时流式返回裸 s16le PCM
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceInfo>,
    pub default_voice: String,
}

// ============================================================================
// Health / Info DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine_reachable: bool,
    pub model: ModelStatus,
    pub active_sessions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<crate::application::CacheStats>,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

// ============================================================================
// WebSocket 会话协议
// ============================================================================

/// 客户端 → 服务端
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// 打开会话
    Start {
        #[serde(default)]
        voice: Option<String>,
        #[serde(default = "default_speed")]
        speed: f32,
        /// 边界模式: sentence | line，缺省按句切分
        #[serde(default)]
        boundary: Option<BoundaryMode>,
    },
    /// 追加文本；空 content 等价于 end
    Text { content: String },
    /// 结束会话（冲洗残余文本）
    End,
}

/// 服务端 → 客户端（JSON 事件；PCM 以二进制帧单独下发）
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum SessionEvent {
    Started {
        session_id: Uuid,
        sample_rate: u32,
        voice: String,
    },
    Segment {
        index: u64,
        samples: usize,
    },
    End {
        segments: u64,
    },
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_request_defaults() {
        let req: SpeechRequest = serde_json::from_str(r#"{"input":"hello"}"#).unwrap();
        assert_eq!(req.input, "hello");
        assert!(req.voice.is_none());
        assert_eq!(req.speed, 1.0);
        assert!(!req.stream);
    }

    #[test]
    fn test_client_message_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"start","voice":"nature","boundary":"line"}"#).unwrap();
        match msg {
            ClientMessage::Start {
                voice, boundary, ..
            } => {
                assert_eq!(voice.as_deref(), Some("nature"));
                assert_eq!(boundary, Some(BoundaryMode::Line));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"end"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::End));

        // 未知边界模式在反序列化阶段被拒绝
        assert!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"start","boundary":"word"}"#).is_err()
        );
    }

    #[test]
    fn test_session_event_shape() {
        let event = SessionEvent::Segment {
            index: 2,
            samples: 4800,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "segment");
        assert_eq!(json["data"]["index"], 2);
    }
}
