//! Utils Module
pub mod logging;
pub mod sse;
pub mod text;

pub use logging::{init_tracing, LogGuard, LogTarget};
pub use sse::SseDecoder;
pub use text::{balanced_object, truncate_middle};
