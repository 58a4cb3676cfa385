//! Core relay functionality: wire frames, connections, sessions and fan-out

pub mod broadcast;
pub mod connection;
pub mod handshake;
pub mod message;
pub mod moderation;
pub mod rate_limiter;
pub mod server;
pub mod session;

// Re-export main components for convenience
pub use broadcast::Broadcaster;
pub use connection::{Connection, ConnectionId};
pub use handshake::{CompletionSignal, HandshakePhase, HandshakeRejection};
pub use message::{ChatColor, Frame, FrameType};
pub use moderation::{BanTable, MuteList};
pub use rate_limiter::MessageRateLimiter;
pub use server::{BanOutcome, ChatServer, SharedChatServer};
pub use session::{create_registry, Session, SessionRegistry, SharedRegistry};
