//! In-Memory Infrastructure - 进程内状态组件

mod model_manager;
mod session_registry;

pub use model_manager::{ModelManager, ModelStatus};
pub use session_registry::{SessionEntry, SessionRegistry};
