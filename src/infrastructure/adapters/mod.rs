//! Infrastructure Adapters - 出站端口实现

pub mod encoder;
pub mod tts;
pub mod voice;

pub use encoder::PcmEncoder;
pub use tts::{FakeTtsEngine, FakeTtsEngineConfig, HttpTtsEngine, HttpTtsEngineConfig};
pub use voice::FsVoiceStore;
