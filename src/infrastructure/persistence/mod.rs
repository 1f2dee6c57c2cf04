//! Persistence Layer - 持久化层

pub mod sled;
