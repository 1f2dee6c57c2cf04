//! HTTP Routes
//!
//! API Endpoints:
//! - /                  GET   服务信息
//! - /health            GET   健康状态（模型生命周期、会话数、缓存）
//! - /v1/audio/speech   POST  合成（OpenAI 兼容；stream=true 流式 PCM）
//! - /v1/audio/voices   GET   音色列表
//! - /v1/audio/stream   WS    流式合成会话

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::service_info))
        .route("/health", get(handlers::health))
        .nest("/v1/audio", audio_routes())
}

fn audio_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/speech", post(handlers::create_speech))
        .route("/voices", get(handlers::list_voices))
        .route("/stream", get(handlers::stream_handler))
}
