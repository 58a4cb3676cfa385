//! Abstract storage interfaces for pluggable backends

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One accepted chat message as written to the chat log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub user: String,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl LoggedMessage {
    pub fn now(user: &str, message: &str) -> Self {
        Self {
            user: user.to_string(),
            message: message.to_string(),
            timestamp: Local::now(),
        }
    }

    /// `YYYY-MM-DD HH:MM:SS [user]: message`
    pub fn to_line(&self) -> String {
        format!(
            "{} [{}]: {}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.user,
            self.message
        )
    }
}

/// Append-only chat log interface
#[async_trait]
pub trait ChatLog: Send + Sync {
    /// Append one message; entries are never rewritten
    async fn append(&self, entry: &LoggedMessage) -> Result<()>;
}
