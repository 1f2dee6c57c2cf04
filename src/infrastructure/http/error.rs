//! HTTP Error Handling
//!
//! 错误响应带真实 HTTP 状态码，响应体保持 {errno, error, data} 结构

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::{SpeechError, VoiceError};

/// 统一错误响应格式
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errno: i32,
    pub error: String,
    pub data: Option<()>,
}

impl ErrorResponse {
    pub fn new(errno: i32, error: impl Into<String>) -> Self {
        Self {
            errno,
            error: error.into(),
            data: None,
        }
    }
}

/// API 错误
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::NotFound(msg) => {
                tracing::warn!(error = %msg, "Resource not found");
                (StatusCode::NOT_FOUND, msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(error = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                tracing::error!(error = %msg, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
        };

        let response = ErrorResponse::new(status.as_u16() as i32, msg);
        (status, Json(response)).into_response()
    }
}

impl From<SpeechError> for ApiError {
    fn from(e: SpeechError) -> Self {
        match e {
            SpeechError::VoiceResolution(ve) => match ve {
                VoiceError::NotFound(id) => ApiError::NotFound(format!("Voice not found: {}", id)),
                VoiceError::InvalidId(id) => ApiError::BadRequest(format!("Invalid voice id: {}", id)),
                other => ApiError::BadRequest(other.to_string()),
            },
            SpeechError::InvalidRequest(msg) => ApiError::BadRequest(msg),
            SpeechError::Load(msg) => {
                ApiError::ServiceUnavailable(format!("Model load failed: {}", msg))
            }
            SpeechError::Synthesis(msg) => ApiError::Internal(format!("Synthesis failed: {}", msg)),
            SpeechError::Encode(e) => ApiError::BadRequest(e.to_string()),
            SpeechError::Cancelled => ApiError::Internal("Session cancelled".to_string()),
        }
    }
}
