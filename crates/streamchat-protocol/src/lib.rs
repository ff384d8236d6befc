//! Wire types for the streamchat chat protocol.
//!
//! A chat turn is requested with a [`ChatStreamRequest`] and answered with a
//! `text/event-stream` body in which every frame carries one JSON-encoded
//! [`StreamEvent`]. The last frame of every stream has `done: true`.

pub mod events;
pub mod messages;

pub use events::{ErrorResponse, StreamEvent};
pub use messages::{ChatStreamRequest, Role, Turn};
