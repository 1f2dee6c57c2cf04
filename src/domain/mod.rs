//! Domain Layer - 领域层
//!
//! 纯逻辑，不依赖运行时：
//! - boundary: 文本边界检测与累积
//! - normalizer: 棘轮增益归一化

pub mod boundary;
pub mod normalizer;

pub use boundary::{BoundaryMode, TextAccumulator};
pub use normalizer::{pcm_bytes, GainRatchet};
