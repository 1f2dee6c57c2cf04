//! Application State
//!
//! HTTP 层共享状态：核心服务加上健康上报所需的组件引用

use std::sync::Arc;

use crate::application::{AudioCachePort, AudioFormat, SpeechService, TtsEnginePort};
use crate::infrastructure::memory::ModelManager;

/// 应用状态
pub struct AppState {
    pub speech: Arc<SpeechService>,
    pub manager: Arc<ModelManager>,
    pub engine: Arc<dyn TtsEnginePort>,
    pub cache: Option<Arc<dyn AudioCachePort>>,
    /// 请求未指定音色时的默认值
    pub default_voice: String,
    /// 请求未指定 response_format 时的默认值
    pub default_format: AudioFormat,
}

impl AppState {
    pub fn new(
        speech: Arc<SpeechService>,
        manager: Arc<ModelManager>,
        engine: Arc<dyn TtsEnginePort>,
        cache: Option<Arc<dyn AudioCachePort>>,
        default_voice: String,
        default_format: AudioFormat,
    ) -> Self {
        Self {
            speech,
            manager,
            engine,
            cache,
            default_voice,
            default_format,
        }
    }
}
