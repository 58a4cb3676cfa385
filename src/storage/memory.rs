//! In-memory chat log for development and testing
//!
//! Keeps every appended entry in memory. Suitable for tests or for running
//! without touching the filesystem.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{ChatLog, LoggedMessage};
use crate::error::Result;

#[derive(Default, Clone)]
pub struct MemoryChatLog {
    entries: Arc<RwLock<Vec<LoggedMessage>>>,
}

impl MemoryChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<LoggedMessage> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl ChatLog for MemoryChatLog {
    async fn append(&self, entry: &LoggedMessage) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}
