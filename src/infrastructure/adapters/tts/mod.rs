//! TTS Engine 适配器

mod fake_tts_engine;
mod http_tts_engine;

pub use fake_tts_engine::{FakeTtsEngine, FakeTtsEngineConfig};
pub use http_tts_engine::{HttpTtsEngine, HttpTtsEngineConfig};
