//! tchat relay - a lightweight TCP chat relay implemented in Rust
//!
//! This library provides the server side of the tchat protocol: the
//! handshake, session registry, broadcast with history replay, rate
//! limiting and operator moderation.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod security;
pub mod security_logger;
pub mod storage;

// Re-export main components
pub use config::ServerConfig;
pub use core::{ChatServer, Frame, FrameType, SharedChatServer};
pub use error::{RelayError, Result};
