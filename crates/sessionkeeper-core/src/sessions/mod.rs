//! Multi-device session listing and termination.

pub mod cache;
pub mod registry;

pub use cache::CachedData;
pub use registry::{SessionInfo, SessionRegistry};
