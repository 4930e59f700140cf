//! Infrastructure Layer
//!
//! Cross-cutting concerns: request correlation ids and graceful shutdown.

pub mod request_id;
pub mod shutdown;

pub use request_id::RequestIdGenerator;
pub use shutdown::{shutdown_signal, RequestGuard, ShutdownController};
