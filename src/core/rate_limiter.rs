//! Rate limiting module to prevent message floods
//!
//! Each session owns its own limiter, so no locking is involved.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::constants::{RATE_LIMIT_MAX_MESSAGES, RATE_LIMIT_WINDOW_SECS};

/// Sliding-window message counter for a single session
#[derive(Debug, Clone)]
pub struct MessageRateLimiter {
    message_times: VecDeque<Instant>,
    max_messages: usize,
    window_duration: Duration,
}

impl Default for MessageRateLimiter {
    fn default() -> Self {
        Self::new(
            RATE_LIMIT_MAX_MESSAGES,
            Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
        )
    }
}

impl MessageRateLimiter {
    pub fn new(max_messages: usize, window_duration: Duration) -> Self {
        Self {
            message_times: VecDeque::with_capacity(max_messages),
            max_messages,
            window_duration,
        }
    }

    /// Check if the session can send another message right now
    pub fn allow_message(&mut self) -> bool {
        self.allow_message_at(Instant::now())
    }

    /// Check and record a message sent at `now`
    ///
    /// A rejected message is not recorded.
    pub fn allow_message_at(&mut self, now: Instant) -> bool {
        self.evict_expired(now);

        if self.message_times.len() >= self.max_messages {
            return false;
        }

        self.message_times.push_back(now);
        true
    }

    /// Messages counted in the window ending at `now`
    pub fn message_count_at(&mut self, now: Instant) -> usize {
        self.evict_expired(now);
        self.message_times.len()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(&oldest) = self.message_times.front() {
            if now.duration_since(oldest) < self.window_duration {
                break;
            }
            self.message_times.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eleventh_message_in_window_is_rejected() {
        let mut limiter = MessageRateLimiter::new(10, Duration::from_secs(5));
        let start = Instant::now();

        for _ in 0..10 {
            assert!(limiter.allow_message_at(start));
        }
        assert!(!limiter.allow_message_at(start + Duration::from_secs(1)));

        // Past the window everything has expired
        assert!(limiter.allow_message_at(start + Duration::from_secs(6)));
        assert_eq!(limiter.message_count_at(start + Duration::from_secs(6)), 1);
    }

    #[test]
    fn test_rejection_does_not_consume_a_slot() {
        let mut limiter = MessageRateLimiter::new(2, Duration::from_secs(5));
        let start = Instant::now();

        assert!(limiter.allow_message_at(start));
        assert!(limiter.allow_message_at(start + Duration::from_secs(1)));
        for _ in 0..5 {
            assert!(!limiter.allow_message_at(start + Duration::from_secs(2)));
        }

        // Only the first timestamp has left the window
        assert!(limiter.allow_message_at(start + Duration::from_secs(5)));
        assert!(!limiter.allow_message_at(start + Duration::from_secs(5)));
    }

    #[test]
    fn test_window_slides() {
        let mut limiter = MessageRateLimiter::default();
        let start = Instant::now();

        for i in 0..10 {
            assert!(limiter.allow_message_at(start + Duration::from_millis(i * 400)));
        }
        // First message (t=0) expires at t=5s, freeing exactly one slot
        assert!(!limiter.allow_message_at(start + Duration::from_millis(4999)));
        assert!(limiter.allow_message_at(start + Duration::from_millis(5000)));
        assert!(!limiter.allow_message_at(start + Duration::from_millis(5001)));
    }
}
