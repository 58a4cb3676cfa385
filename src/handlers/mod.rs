//! Handlers for client connections and the operator console

pub mod admin;
pub mod session_loop;

pub use admin::{run_console, AdminCommand, AdminParseError};
pub use session_loop::handle_connection;
