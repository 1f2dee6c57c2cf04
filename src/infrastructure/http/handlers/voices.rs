//! Voices Handler - 音色列表

use axum::extract::{Json, State};
use std::sync::Arc;

use super::super::dto::{ApiResponse, VoicesResponse};
use super::super::error::ApiError;
use super::super::state::AppState;

/// GET /v1/audio/voices
pub async fn list_voices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<VoicesResponse>>, ApiError> {
    let voices = state.speech.list_voices().await?;
    Ok(Json(ApiResponse::success(VoicesResponse {
        voices,
        default_voice: state.default_voice.clone(),
    })))
}
