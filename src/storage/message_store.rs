//! Simple in-memory storage for recent chat messages
//!
//! This implementation provides a bounded FIFO used to replay recent
//! messages to newly admitted sessions. Nothing is persisted to disk.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::constants::DEFAULT_HISTORY_CAPACITY;
use crate::core::message::Frame;

/// Bounded history of chat frames, oldest first
#[derive(Debug)]
pub struct HistoryBuffer {
    messages: VecDeque<Frame>,
    max_size: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            max_size: capacity,
        }
    }

    /// Add a message, removing the oldest if at capacity
    pub fn push(&mut self, message: Frame) {
        if self.max_size == 0 {
            return;
        }

        while self.messages.len() >= self.max_size {
            self.messages.pop_front();
        }

        self.messages.push_back(message);
    }

    /// Copy of all messages in original order
    pub fn snapshot(&self) -> Vec<Frame> {
        self.messages.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

/// Thread-safe wrapper for HistoryBuffer
pub type SharedHistory = Arc<Mutex<HistoryBuffer>>;

/// Create a new thread-safe history buffer with custom capacity
pub fn create_history(capacity: usize) -> SharedHistory {
    Arc::new(Mutex::new(HistoryBuffer::with_capacity(capacity)))
}
