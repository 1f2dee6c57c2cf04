//! Audio Encoder 适配器

mod pcm_encoder;

pub use pcm_encoder::PcmEncoder;
