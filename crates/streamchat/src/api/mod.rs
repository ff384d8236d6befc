//! HTTP API module.
//!
//! Streaming chat endpoints over server-sent events plus read-only session
//! history.

mod error;
pub mod handlers;
mod routes;
mod sse;
mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use sse::{SseBody, SseSink, channel};
pub use state::AppState;
