//! Health Handler - 健康与服务信息

use axum::extract::{Json, State};
use std::sync::Arc;

use super::super::dto::{ApiResponse, HealthResponse, ServiceInfo};
use super::super::state::AppState;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let engine_reachable = state.engine.health_check().await;
    let model = state.manager.status().await;
    let cache = match &state.cache {
        Some(cache) => Some(cache.stats().await),
        None => None,
    };

    Json(HealthResponse {
        status: if engine_reachable { "ok" } else { "degraded" },
        engine_reachable,
        model,
        active_sessions: state.speech.registry().active_count(),
        cache,
    })
}

/// GET /
pub async fn service_info() -> Json<ApiResponse<ServiceInfo>> {
    Json(ApiResponse::success(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "POST /v1/audio/speech",
            "GET /v1/audio/voices",
            "GET /v1/audio/stream (websocket)",
            "GET /health",
        ],
    }))
}
