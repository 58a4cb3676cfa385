//! Wire frames exchanged between clients and the relay
//!
//! Every frame is a single JSON object whose values are all strings. Clients
//! decode frames as flat string maps, so numeric and boolean handshake fields
//! are carried as strings too.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{HANDSHAKE_START, RESERVED_NAME};
use crate::error::{RelayError, Result};

/// The `type` field of a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FrameType {
    Handshake,
    Message,
    Ping,
    Pong,
    AlreadyInUse,
    InvalidPassword,
    ClearChat,
    /// Anything else, kept verbatim for logging
    Other(String),
}

impl FrameType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Handshake => "handshake",
            Self::Message => "message",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::AlreadyInUse => "alreadyInUse",
            Self::InvalidPassword => "invalidPassword",
            Self::ClearChat => "clearChat",
            Self::Other(raw) => raw,
        }
    }
}

impl Default for FrameType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for FrameType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "handshake" => Self::Handshake,
            "message" => Self::Message,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "alreadyInUse" => Self::AlreadyInUse,
            "invalidPassword" => Self::InvalidPassword,
            "clearChat" => Self::ClearChat,
            _ => Self::Other(raw),
        }
    }
}

impl From<FrameType> for String {
    fn from(kind: FrameType) -> Self {
        match kind {
            FrameType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display colors a client may attach to its messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatColor {
    Reset,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
}

impl ChatColor {
    /// Substitute for colors nobody recognises
    pub const FALLBACK: ChatColor = ChatColor::Blue;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Red => "red",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Blue => "blue",
            Self::Magenta => "magenta",
            Self::Cyan => "cyan",
            Self::White => "white",
        }
    }

    /// ANSI escape sequence used by terminal renderers
    pub fn ansi_code(&self) -> &'static str {
        match self {
            Self::Reset => "\x1b[0m",
            Self::Red => "\x1b[31m",
            Self::Green => "\x1b[32m",
            Self::Yellow => "\x1b[33m",
            Self::Blue => "\x1b[34m",
            Self::Magenta => "\x1b[35m",
            Self::Cyan => "\x1b[36m",
            Self::White => "\x1b[37m",
        }
    }

    /// Resolve a color name, falling back for unknown names
    pub fn resolve(name: &str) -> ChatColor {
        name.parse().unwrap_or_else(|_| {
            log::debug!("Invalid color requested: {}", name);
            Self::FALLBACK
        })
    }
}

impl FromStr for ChatColor {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reset" => Ok(Self::Reset),
            "red" => Ok(Self::Red),
            "green" => Ok(Self::Green),
            "yellow" => Ok(Self::Yellow),
            "blue" => Ok(Self::Blue),
            "magenta" => Ok(Self::Magenta),
            "cyan" => Ok(Self::Cyan),
            "white" => Ok(Self::White),
            other => Err(RelayError::MessageParseError(format!(
                "unknown color: {}",
                other
            ))),
        }
    }
}

/// A single protocol frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(rename = "type", default)]
    pub kind: FrameType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_char_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_protected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_password: Option<String>,
}

impl Frame {
    fn new(kind: FrameType, user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            user: user.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Opening frame the server sends on accept
    pub fn handshake_offer(server_name: &str, char_limit: usize, password_protected: bool) -> Self {
        Self {
            server_name: Some(server_name.to_string()),
            message_char_limit: Some(char_limit.to_string()),
            password_protected: Some(password_protected.to_string()),
            ..Self::new(FrameType::Handshake, RESERVED_NAME, HANDSHAKE_START)
        }
    }

    /// Client reply to the handshake offer
    pub fn handshake_reply(user: &str, ack: &str, password: Option<&str>) -> Self {
        Self {
            server_password: password.map(str::to_string),
            ..Self::new(FrameType::Handshake, user, ack)
        }
    }

    /// Chat message from a user, with its color resolved
    pub fn chat(user: &str, text: &str, color: Option<&str>) -> Self {
        Self {
            color: color.map(|c| ChatColor::resolve(c).as_str().to_string()),
            ..Self::new(FrameType::Message, user, text)
        }
    }

    /// Message authored by the server itself
    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(FrameType::Message, RESERVED_NAME, text)
    }

    pub fn ping(user: &str) -> Self {
        Self::new(FrameType::Ping, user, "")
    }

    pub fn pong() -> Self {
        Self::new(FrameType::Pong, "", "")
    }

    pub fn already_in_use() -> Self {
        Self::new(FrameType::AlreadyInUse, RESERVED_NAME, "Username already in use")
    }

    pub fn invalid_password() -> Self {
        Self::new(FrameType::InvalidPassword, RESERVED_NAME, "Invalid password")
    }

    pub fn clear_chat() -> Self {
        Self::new(
            FrameType::ClearChat,
            RESERVED_NAME,
            "Chat history has been cleared by the server.",
        )
    }

    /// Chat messages written by users, as opposed to server notices
    pub fn is_chat(&self) -> bool {
        self.kind == FrameType::Message && self.user != RESERVED_NAME
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Cut `text` down to at most `limit` characters
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
