//! Security-focused logging module to track security events

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Types of security events to track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    // Handshake events
    AuthenticationFailed { name: Option<String>, ip: IpAddr, reason: String },
    AuthenticationSuccess { name: String, ip: IpAddr },
    HandshakeTimeout { ip: IpAddr },

    // Abuse
    RateLimitExceeded { name: String, ip: IpAddr },
    ProtocolViolation { name: Option<String>, ip: IpAddr, details: String },

    // Moderation
    ConnectionBlocked { ip: IpAddr, reason: String },
    ModerationAction { action: String, target: String, ip: Option<IpAddr> },
}

impl SecurityEvent {
    /// Key used for counters and alert thresholds
    pub fn key(&self) -> &'static str {
        match self {
            SecurityEvent::AuthenticationFailed { .. } => "auth_failed",
            SecurityEvent::AuthenticationSuccess { .. } => "auth_success",
            SecurityEvent::HandshakeTimeout { .. } => "handshake_timeout",
            SecurityEvent::RateLimitExceeded { .. } => "rate_limit",
            SecurityEvent::ProtocolViolation { .. } => "protocol_violation",
            SecurityEvent::ConnectionBlocked { .. } => "connection_blocked",
            SecurityEvent::ModerationAction { .. } => "moderation",
        }
    }
}

/// Security event with timestamp
#[derive(Debug, Clone)]
struct TimestampedEvent {
    event: SecurityEvent,
    timestamp: Instant,
}

/// Security logger for tracking and alerting on security events
pub struct SecurityLogger {
    events: RwLock<Vec<TimestampedEvent>>,
    event_counts: RwLock<HashMap<&'static str, usize>>,
    max_events: usize,
    alert_thresholds: HashMap<&'static str, usize>,
}

impl Default for SecurityLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityLogger {
    /// Create a new security logger
    pub fn new() -> Self {
        Self::with_capacity(10000)
    }

    /// Create a logger that keeps at most `max_events` events in memory
    pub fn with_capacity(max_events: usize) -> Self {
        let mut alert_thresholds = HashMap::new();
        alert_thresholds.insert("auth_failed", 5);
        alert_thresholds.insert("handshake_timeout", 20);
        alert_thresholds.insert("rate_limit", 10);
        alert_thresholds.insert("protocol_violation", 10);
        alert_thresholds.insert("connection_blocked", 15);

        Self {
            events: RwLock::new(Vec::new()),
            event_counts: RwLock::new(HashMap::new()),
            max_events,
            alert_thresholds,
        }
    }

    /// Log a security event
    pub async fn log_event(&self, event: SecurityEvent) {
        let event_key = event.key();

        {
            let mut events = self.events.write().await;
            events.push(TimestampedEvent {
                event: event.clone(),
                timestamp: Instant::now(),
            });

            // Limit memory usage
            if events.len() > self.max_events {
                let events_to_remove = events.len() - self.max_events;
                events.drain(0..events_to_remove);
            }
        }

        // Update counters and check for alerts
        {
            let mut counts = self.event_counts.write().await;
            let count = counts.entry(event_key).or_insert(0);
            *count += 1;

            if let Some(&threshold) = self.alert_thresholds.get(event_key) {
                if *count % threshold == 0 {
                    log::error!(
                        "SECURITY ALERT: {} events of type '{}' detected",
                        count,
                        event_key
                    );
                    log::error!("Sample event: {:?}", event);
                }
            }
        }

        match event {
            SecurityEvent::AuthenticationFailed { name, ip, reason } => {
                log::warn!("SECURITY: Handshake rejected - User: {:?}, IP: {}, Reason: {}", name, ip, reason);
            }
            SecurityEvent::AuthenticationSuccess { name, ip } => {
                log::info!("SECURITY: Client admitted - User: {}, IP: {}", name, ip);
            }
            SecurityEvent::HandshakeTimeout { ip } => {
                log::warn!("SECURITY: Handshake timed out - IP: {}", ip);
            }
            SecurityEvent::RateLimitExceeded { name, ip } => {
                log::warn!("SECURITY: Rate limit exceeded - User: {}, IP: {}", name, ip);
            }
            SecurityEvent::ProtocolViolation { name, ip, details } => {
                log::warn!("SECURITY: Protocol violation - User: {:?}, IP: {}, Details: {}", name, ip, details);
            }
            SecurityEvent::ConnectionBlocked { ip, reason } => {
                log::warn!("SECURITY: Connection blocked - IP: {}, Reason: {}", ip, reason);
            }
            SecurityEvent::ModerationAction { action, target, ip } => {
                log::info!("SECURITY: Moderation - Action: {}, Target: {}, IP: {:?}", action, target, ip);
            }
        }
    }

    /// Get recent security events
    pub async fn recent_events(&self, duration: Duration) -> Vec<SecurityEvent> {
        let events = self.events.read().await;
        let now = Instant::now();

        events
            .iter()
            .filter(|event| now.duration_since(event.timestamp) <= duration)
            .map(|event| event.event.clone())
            .collect()
    }

    /// Get event statistics
    pub async fn event_stats(&self) -> HashMap<&'static str, usize> {
        self.event_counts.read().await.clone()
    }

    /// Count of events logged under `key`
    pub async fn count(&self, key: &str) -> usize {
        self.event_counts.read().await.get(key).copied().unwrap_or(0)
    }

    /// Clean up old events
    pub async fn cleanup_old_events(&self, max_age: Duration) {
        let mut events = self.events.write().await;
        let now = Instant::now();

        events.retain(|event| now.duration_since(event.timestamp) <= max_age);
    }

    /// Start periodic cleanup task
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300)); // Every 5 minutes
            loop {
                interval.tick().await;
                self.cleanup_old_events(Duration::from_secs(3600 * 24)).await; // Keep 24 hours
            }
        });
    }
}
