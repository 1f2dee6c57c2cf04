//! HTTP Handlers

mod health;
mod speech;
mod stream;
mod voices;

pub use health::*;
pub use speech::*;
pub use stream::*;
pub use voices::*;
