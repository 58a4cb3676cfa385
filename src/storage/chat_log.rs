//! File-backed chat log

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::traits::{ChatLog, LoggedMessage};
use crate::error::{RelayError, Result};

/// Appends one line per message to a text file
pub struct FileChatLog {
    path: PathBuf,
}

impl FileChatLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChatLog for FileChatLog {
    async fn append(&self, entry: &LoggedMessage) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                RelayError::StorageError(format!(
                    "failed to open chat log {}: {}",
                    self.path.display(),
                    e
                ))
            })?;

        // Single write per line so concurrent appends never interleave
        file.write_all(entry.to_line().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
