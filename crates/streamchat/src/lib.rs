//! Streaming chat assistant.
//!
//! Answers each user turn through a reasoning engine, normalizes the engine's
//! events into client frames, streams them over server-sent events and commits
//! the finished turn to the session history.

pub mod api;
pub mod chat;
pub mod config;
pub mod engine;
pub mod rag;
pub mod session;
pub mod tools;

pub use streamchat_protocol as protocol;
