//! Handshake protocol run by every connection before it is admitted
//!
//! The server opens with a `handshake` offer, the client answers with its
//! name (and the shared password when one is configured). A watchdog closes
//! connections that do not finish in time; it races the handshake through a
//! [`CompletionSignal`] so exactly one of them acts.

use log::info;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::ServerConfig;
use crate::constants::{HANDSHAKE_ACK, MAX_NAME_LEN, MIN_NAME_LEN, RESERVED_NAME};
use crate::core::connection::Connection;
use crate::core::message::Frame;
use crate::security::timing::passwords_match;

/// Where a connection stands in the protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakePhase {
    AwaitingHandshake,
    Admitted { name: String },
}

/// Why a handshake reply was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeRejection {
    /// `message` was not the acknowledgement, the client may retry
    NotAcknowledged,
    InvalidPassword,
    EmptyName,
    ReservedName,
    NameLength(usize),
    NameInUse,
}

impl HandshakeRejection {
    /// Everything except a missing acknowledgement ends the connection
    pub fn closes_connection(&self) -> bool {
        !matches!(self, Self::NotAcknowledged)
    }

    /// Frame sent to the client before acting on the rejection
    pub fn reply(&self) -> Option<Frame> {
        match self {
            Self::NotAcknowledged => Some(Frame::notice("Invalid handshake message")),
            Self::InvalidPassword => Some(Frame::invalid_password()),
            Self::EmptyName => None,
            Self::ReservedName => Some(Frame::notice(format!(
                "Username '{}' is reserved",
                RESERVED_NAME
            ))),
            Self::NameLength(_) => Some(Frame::notice(format!(
                "Username must be between {} and {} characters",
                MIN_NAME_LEN, MAX_NAME_LEN
            ))),
            Self::NameInUse => Some(Frame::already_in_use()),
        }
    }
}

impl fmt::Display for HandshakeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAcknowledged => write!(f, "invalid handshake acknowledgement"),
            Self::InvalidPassword => write!(f, "invalid password"),
            Self::EmptyName => write!(f, "empty username"),
            Self::ReservedName => write!(f, "reserved username"),
            Self::NameLength(len) => write!(f, "username length {} out of range", len),
            Self::NameInUse => write!(f, "username already in use"),
        }
    }
}

/// Check a client's handshake reply, returning the name to admit
///
/// Name uniqueness is not checked here; the registry enforces it atomically
/// on insert and the caller maps that failure to [`HandshakeRejection::NameInUse`].
pub fn validate_handshake(
    reply: &Frame,
    config: &ServerConfig,
) -> std::result::Result<String, HandshakeRejection> {
    if reply.message != HANDSHAKE_ACK {
        return Err(HandshakeRejection::NotAcknowledged);
    }

    if config.password_protected {
        let offered = reply.server_password.as_deref().unwrap_or_default();
        if !passwords_match(offered, &config.server_password) {
            return Err(HandshakeRejection::InvalidPassword);
        }
    }

    let name = reply.user.as_str();
    if name.is_empty() {
        return Err(HandshakeRejection::EmptyName);
    }

    if name.eq_ignore_ascii_case(RESERVED_NAME) {
        return Err(HandshakeRejection::ReservedName);
    }

    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(HandshakeRejection::NameLength(len));
    }

    Ok(name.to_string())
}

/// How a watchdog finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    Completed,
    TimedOut,
}

/// Single-use marker shared by a handshake and its watchdog
///
/// Whoever settles it first wins. Repeated completions are no-ops and
/// never block.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    settled: AtomicBool,
    notify: Notify,
}

impl CompletionSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn settle(&self) -> bool {
        self.settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark the handshake finished, returns false if the watchdog already fired
    pub fn complete(&self) -> bool {
        if self.settle() {
            self.notify.notify_one();
            true
        } else {
            false
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Wait for completion or for the timeout to win the race
    pub async fn watch(&self, timeout: Duration) -> WatchdogOutcome {
        tokio::select! {
            _ = self.notify.notified() => WatchdogOutcome::Completed,
            _ = tokio::time::sleep(timeout) => {
                if self.settle() {
                    WatchdogOutcome::TimedOut
                } else {
                    WatchdogOutcome::Completed
                }
            }
        }
    }
}

/// Close `connection` unless the handshake completes within `timeout`
pub fn spawn_watchdog(
    signal: Arc<CompletionSignal>,
    connection: Arc<Connection>,
    timeout: Duration,
) -> tokio::task::JoinHandle<WatchdogOutcome> {
    tokio::spawn(async move {
        let outcome = signal.watch(timeout).await;
        if outcome == WatchdogOutcome::TimedOut {
            info!(
                "Handshake not completed by {} within {:?}, closing connection",
                connection.addr, timeout
            );
            connection.close();
        }
        outcome
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protected_config() -> ServerConfig {
        ServerConfig {
            password_protected: true,
            server_password: "secret".to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_valid_handshake() {
        let config = ServerConfig::default();
        let reply = Frame::handshake_reply("alice", "OK", None);
        assert_eq!(validate_handshake(&reply, &config), Ok("alice".to_string()));

        let config = protected_config();
        let reply = Frame::handshake_reply("alice", "OK", Some("secret"));
        assert_eq!(validate_handshake(&reply, &config), Ok("alice".to_string()));
    }

    #[test]
    fn test_validation_order() {
        let config = protected_config();

        // Password is checked before anything about the name
        let reply = Frame::handshake_reply("", "OK", Some("wrong"));
        assert_eq!(
            validate_handshake(&reply, &config),
            Err(HandshakeRejection::InvalidPassword)
        );
        let reply = Frame::handshake_reply("alice", "OK", None);
        assert_eq!(
            validate_handshake(&reply, &config),
            Err(HandshakeRejection::InvalidPassword)
        );

        let reply = Frame::handshake_reply("", "OK", Some("secret"));
        assert_eq!(validate_handshake(&reply, &config), Err(HandshakeRejection::EmptyName));

        let reply = Frame::handshake_reply("server", "OK", Some("secret"));
        assert_eq!(
            validate_handshake(&reply, &config),
            Err(HandshakeRejection::ReservedName)
        );

        let reply = Frame::handshake_reply("al", "OK", Some("secret"));
        assert_eq!(
            validate_handshake(&reply, &config),
            Err(HandshakeRejection::NameLength(2))
        );

        let reply = Frame::handshake_reply(&"x".repeat(21), "OK", Some("secret"));
        assert_eq!(
            validate_handshake(&reply, &config),
            Err(HandshakeRejection::NameLength(21))
        );
    }

    #[test]
    fn test_missing_ack_keeps_connection() {
        let reply = Frame::handshake_reply("alice", "hello", None);
        let rejection = validate_handshake(&reply, &ServerConfig::default()).unwrap_err();
        assert_eq!(rejection, HandshakeRejection::NotAcknowledged);
        assert!(!rejection.closes_connection());
        assert!(rejection.reply().is_some());
    }

    #[test]
    fn test_rejection_replies() {
        assert!(HandshakeRejection::EmptyName.reply().is_none());
        assert_eq!(
            HandshakeRejection::InvalidPassword.reply().unwrap(),
            Frame::invalid_password()
        );
        assert_eq!(
            HandshakeRejection::NameInUse.reply().unwrap(),
            Frame::already_in_use()
        );
        assert!(HandshakeRejection::NameInUse.closes_connection());
    }

    #[tokio::test]
    async fn test_completion_before_timeout() {
        let signal = CompletionSignal::new();
        assert!(signal.complete());
        assert!(!signal.complete());
        assert_eq!(
            signal.watch(Duration::from_secs(5)).await,
            WatchdogOutcome::Completed
        );
    }

    #[tokio::test]
    async fn test_timeout_wins_when_nobody_completes() {
        let signal = CompletionSignal::new();
        assert_eq!(
            signal.watch(Duration::from_millis(10)).await,
            WatchdogOutcome::TimedOut
        );
        assert!(!signal.complete());
        assert!(signal.is_settled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_one_side_wins_under_contention() {
        for _ in 0..500 {
            let signal = CompletionSignal::new();

            let watcher = {
                let signal = signal.clone();
                tokio::spawn(async move { signal.watch(Duration::from_micros(50)).await })
            };
            let completer = {
                let signal = signal.clone();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    signal.complete()
                })
            };

            let completed = completer.await.unwrap();
            let outcome = watcher.await.unwrap();
            assert_ne!(completed, outcome == WatchdogOutcome::TimedOut);
        }
    }

    #[tokio::test]
    async fn test_watchdog_closes_connection() {
        let connection = Connection::spawn(tokio::io::sink(), "127.0.0.1:4000".parse().unwrap());
        let signal = CompletionSignal::new();

        let outcome = spawn_watchdog(signal, connection.clone(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(outcome, WatchdogOutcome::TimedOut);
        assert!(connection.is_closed());
    }
}
