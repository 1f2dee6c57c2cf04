//! Voice Store 适配器

mod fs_voice_store;

pub use fs_voice_store::FsVoiceStore;
