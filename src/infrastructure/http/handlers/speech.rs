//! Speech Handler - 一次性合成与 HTTP 流式输出

use axum::{
    body::Body,
    extract::{Json, State},
    http::{header, Response, StatusCode},
};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::application::{AudioFormat, SpeechError};
use crate::domain::{pcm_bytes, BoundaryMode};

use super::super::dto::SpeechRequest;
use super::super::error::ApiError;
use super::super::state::AppState;

/// POST /v1/audio/speech
///
/// OpenAI 兼容入口。stream=false 返回编码容器；
/// stream=true 以 chunked 响应体推裸 s16le PCM
pub async fn create_speech(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeechRequest>,
) -> Result<Response<Body>, ApiError> {
    let voice_id = request
        .voice
        .clone()
        .unwrap_or_else(|| state.default_voice.clone());
    let format = match request.response_format.as_deref() {
        Some(s) => s
            .parse::<AudioFormat>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => state.default_format,
    };

    if request.stream {
        return stream_speech(state, request, voice_id).await;
    }

    let (data, summary) = state
        .speech
        .synthesize_once(&request.input, &voice_id, request.speed, format)
        .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"speech.{}\"", format.as_str()),
        )
        .header("X-Audio-Sample-Rate", summary.sample_rate.to_string())
        .header("X-Audio-Duration-Ms", summary.duration_ms.to_string())
        .header("X-Audio-Cache-Hit", if summary.cached { "1" } else { "0" })
        .body(Body::from(data))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// stream=true 路径：会话在后台任务里串行合成，
/// 响应体直接消费会话的 PCM 通道
async fn stream_speech(
    state: Arc<AppState>,
    request: SpeechRequest,
    voice_id: String,
) -> Result<Response<Body>, ApiError> {
    if request.input.trim().is_empty() {
        return Err(ApiError::BadRequest("input text is empty".to_string()));
    }

    let mut session = state
        .speech
        .open_session(&voice_id, BoundaryMode::Sentence, request.speed)
        .await?;

    let mut segments = session.ingest(&request.input);
    if let Some(residual) = session.flush() {
        segments.push(residual);
    }
    let sample_rate = session.sample_rate();

    let (tx, rx) = mpsc::channel::<Vec<i16>>(8);
    let speech = state.speech.clone();
    tokio::spawn(async move {
        for segment in &segments {
            match session.synthesize_segment(segment, &tx).await {
                Ok(_) => speech.record_segment(&session),
                Err(SpeechError::Cancelled) => {
                    tracing::debug!(session_id = %session.id(), "Stream client disconnected");
                    break;
                }
                Err(e) => {
                    // 流已经开始，只能截断响应体
                    tracing::error!(session_id = %session.id(), error = %e, "Stream synthesis failed");
                    break;
                }
            }
        }
        speech.close_session(&session);
    });

    let body_stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|pcm| (Ok::<_, std::io::Error>(pcm_bytes(&pcm)), rx))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/pcm")
        .header("X-Audio-Sample-Rate", sample_rate.to_string())
        .header("X-Audio-Channels", "1")
        .header("X-Audio-Format", "s16le")
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::Internal(e.to_string()))
}
