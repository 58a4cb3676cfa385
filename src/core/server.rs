//! Chat server that ties the registry, moderation and broadcasting together

use log::{debug, info, warn};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::core::broadcast::Broadcaster;
use crate::core::connection::{Connection, ConnectionId};
use crate::core::message::{truncate_chars, Frame};
use crate::core::moderation::BanTable;
use crate::core::session::{create_registry, Session, SharedRegistry};
use crate::error::{RelayError, Result};
use crate::handlers::session_loop::handle_connection;
use crate::security::profanity::{ProfanityFilter, WordListFilter};
use crate::security_logger::{SecurityEvent, SecurityLogger};
use crate::storage::chat_log::FileChatLog;
use crate::storage::message_store::create_history;
use crate::storage::traits::{ChatLog, LoggedMessage};

/// Result of banning a user by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanOutcome {
    pub ip: IpAddr,
    /// False when the address was already banned
    pub newly_banned: bool,
    /// Live sessions closed because they shared the address
    pub closed_sessions: usize,
}

/// Shared state of a running relay
///
/// Every store is owned by the server instance, so tests can run several
/// isolated servers in one process.
pub struct ChatServer {
    config: ServerConfig,
    registry: SharedRegistry,
    bans: BanTable,
    broadcaster: Broadcaster,
    profanity: Arc<dyn ProfanityFilter>,
    chat_log: Option<Arc<dyn ChatLog>>,
    security: Arc<SecurityLogger>,
}

pub type SharedChatServer = Arc<ChatServer>;

impl ChatServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = create_registry();
        let broadcaster = Broadcaster::new(
            registry.clone(),
            create_history(config.history_capacity),
            config.send_message_history,
            config.history_pacing,
        );

        let chat_log: Option<Arc<dyn ChatLog>> = if config.log_messages {
            Some(Arc::new(FileChatLog::new(&config.chat_log_path)))
        } else {
            None
        };

        Self {
            config,
            registry,
            bans: BanTable::new(),
            broadcaster,
            profanity: Arc::new(WordListFilter::default()),
            chat_log,
            security: Arc::new(SecurityLogger::new()),
        }
    }

    pub fn with_profanity_filter(mut self, filter: Arc<dyn ProfanityFilter>) -> Self {
        self.profanity = filter;
        self
    }

    /// Replace the chat log sink, regardless of `logMessages`
    pub fn with_chat_log(mut self, chat_log: Arc<dyn ChatLog>) -> Self {
        self.chat_log = Some(chat_log);
        self
    }

    pub fn with_security_logger(mut self, security: Arc<SecurityLogger>) -> Self {
        self.security = security;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn bans(&self) -> &BanTable {
        &self.bans
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn security_logger(&self) -> &Arc<SecurityLogger> {
        &self.security
    }

    pub async fn online_count(&self) -> usize {
        self.registry.count().await
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind(addr.as_str()).await.map_err(|e| {
            RelayError::ConnectionError(format!("failed to bind {}: {}", addr, e))
        })
    }

    /// Accept connections forever, one session task per client
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Server '{}' listening on {}", self.config.server_name, addr),
            Err(e) => warn!("Listening on unknown address: {}", e),
        }

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            if self.bans.is_banned(addr.ip()).await {
                self.security
                    .log_event(SecurityEvent::ConnectionBlocked {
                        ip: addr.ip(),
                        reason: "address is banned".to_string(),
                    })
                    .await;
                drop(stream);
                continue;
            }

            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
            }

            let server = self.clone();
            tokio::spawn(async move {
                handle_connection(server, stream, addr).await;
            });
        }
    }

    /// Admit a connection that passed the handshake
    ///
    /// Inserts it into the registry, announces it, replays history and
    /// finally greets it with the online count. Fails with
    /// [`RelayError::DuplicateName`] when the name is taken.
    pub async fn admit(&self, connection: &Arc<Connection>, name: &str) -> Result<()> {
        let addr = connection.addr;
        if self.bans.is_banned(addr.ip()).await {
            return Err(RelayError::ConnectionError(format!(
                "{} was banned during the handshake",
                addr
            )));
        }

        self.registry
            .admit(Session::new(connection.clone(), name))
            .await?;

        // A ban may have swept the registry between the check and the insert
        if self.bans.is_banned(addr.ip()).await {
            self.registry.remove(connection.id).await;
            return Err(RelayError::ConnectionError(format!(
                "{} was banned during the handshake",
                addr
            )));
        }

        self.security
            .log_event(SecurityEvent::AuthenticationSuccess {
                name: name.to_string(),
                ip: addr.ip(),
            })
            .await;

        self.broadcaster
            .broadcast(&Frame::notice(format!("{} has joined the chat", name)))
            .await;

        if self.config.send_message_history {
            let replayed = self.broadcaster.replay_history(connection).await;
            debug!("Replayed {} history messages to {}", replayed, name);
        }

        tokio::time::sleep(self.config.welcome_delay).await;

        let online = self.online_count().await;
        let welcome = Frame::notice(format!(
            "Welcome to {}, there are {} users online",
            self.config.server_name, online
        ));
        self.broadcaster.send_to(connection, &welcome);

        info!("{} ({}) joined, {} users online", name, addr, online);
        Ok(())
    }

    /// Remove a session from the registry and announce its departure
    ///
    /// Connections that were never admitted are ignored.
    pub async fn drop_session(&self, id: ConnectionId) -> Option<Session> {
        let session = self.registry.remove(id).await?;

        info!(
            "{} ({}) left after {:?}",
            session.name,
            session.connection.addr,
            session.connection.connection_duration()
        );
        self.broadcaster
            .broadcast(&Frame::notice(format!("{} has left the chat", session.name)))
            .await;

        Some(session)
    }

    /// Relay a chat message from an admitted session
    ///
    /// The text is cut to the character limit and censored when the
    /// profanity check is on. The frame carries the admitted name, never a
    /// name the client put in the payload.
    pub async fn relay_chat(&self, name: &str, text: &str, color: Option<&str>) -> usize {
        let mut text = truncate_chars(text, self.config.message_char_limit).to_string();

        if self.config.profanity_check && self.profanity.is_profane(&text) {
            debug!("Censoring message from {}", name);
            text = self.profanity.censor(&text);
        }

        if let Some(chat_log) = &self.chat_log {
            if let Err(e) = chat_log.append(&LoggedMessage::now(name, &text)).await {
                warn!("Failed to write chat log entry for {}: {}", name, e);
            }
        }

        self.broadcaster
            .broadcast(&Frame::chat(name, &text, color))
            .await
    }

    /// Wipe the history and tell every client to clear its screen
    pub async fn clear_history(&self) -> usize {
        self.broadcaster.clear_history().await;
        self.log_moderation("clear_chat", "all", None).await;
        self.broadcaster.broadcast(&Frame::clear_chat()).await
    }

    /// Broadcast a message authored by the server
    pub async fn announce(&self, text: &str) -> usize {
        self.broadcaster.broadcast(&Frame::notice(text)).await
    }

    /// Disconnect the session holding `name`
    pub async fn kick(&self, name: &str) -> Result<()> {
        let session = self
            .registry
            .find_by_name(name)
            .await
            .ok_or_else(|| RelayError::SessionNotFound(name.to_string()))?;

        self.drop_session(session.id()).await;
        session.connection.close();

        self.log_moderation("kick", name, Some(session.ip())).await;
        self.announce(&format!("{} has been kicked by the server.", name))
            .await;
        Ok(())
    }

    /// Ban the address of the session holding `name`
    pub async fn ban(&self, name: &str) -> Result<BanOutcome> {
        let session = self
            .registry
            .find_by_name(name)
            .await
            .ok_or_else(|| RelayError::SessionNotFound(name.to_string()))?;

        let outcome = self.ban_address(session.ip()).await;

        self.log_moderation("ban", name, Some(outcome.ip)).await;
        self.announce(&format!("{} has been banned from the server.", name))
            .await;
        Ok(outcome)
    }

    /// Ban an address and close every live session using it
    ///
    /// Banning an address twice leaves the table unchanged but still closes
    /// whatever sessions reconnected from it.
    pub async fn ban_address(&self, ip: IpAddr) -> BanOutcome {
        let newly_banned = self.bans.ban(ip).await;

        let sessions = self.registry.sessions_from(ip).await;
        for session in &sessions {
            self.drop_session(session.id()).await;
            session.connection.close();
        }

        BanOutcome {
            ip,
            newly_banned,
            closed_sessions: sessions.len(),
        }
    }

    async fn log_moderation(&self, action: &str, target: &str, ip: Option<IpAddr>) {
        self.security
            .log_event(SecurityEvent::ModerationAction {
                action: action.to_string(),
                target: target.to_string(),
                ip,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryChatLog;
    use std::time::Duration;

    fn test_config() -> ServerConfig {
        ServerConfig {
            history_pacing: Duration::ZERO,
            welcome_delay: Duration::ZERO,
            ..ServerConfig::default()
        }
    }

    fn sink_connection(addr: &str) -> Arc<Connection> {
        Connection::spawn(tokio::io::sink(), addr.parse().unwrap())
    }

    #[tokio::test]
    async fn test_admit_and_drop() {
        let server = ChatServer::new(test_config());
        let alice = sink_connection("10.0.0.1:5001");

        server.admit(&alice, "alice").await.unwrap();
        assert_eq!(server.online_count().await, 1);

        let duplicate = sink_connection("10.0.0.2:5002");
        match server.admit(&duplicate, "alice").await {
            Err(RelayError::DuplicateName(_)) => {}
            other => panic!("expected duplicate name, got {:?}", other.err()),
        }
        assert_eq!(server.online_count().await, 1);

        assert!(server.drop_session(alice.id).await.is_some());
        assert!(server.drop_session(alice.id).await.is_none());
        assert!(server.drop_session(duplicate.id).await.is_none());
        assert_eq!(server.online_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ban_racing_admissions_leaves_no_session() {
        let server = Arc::new(ChatServer::new(test_config()));
        let ip: IpAddr = "10.0.0.9".parse().unwrap();

        let mut admissions = Vec::new();
        for i in 0..64 {
            let server = server.clone();
            admissions.push(tokio::spawn(async move {
                let connection = sink_connection(&format!("10.0.0.9:{}", 7000 + i));
                server.admit(&connection, &format!("user{}", i)).await
            }));
        }
        tokio::task::yield_now().await;
        server.ban_address(ip).await;

        for admission in admissions {
            let _ = admission.await.unwrap();
        }
        assert!(server.registry().sessions_from(ip).await.is_empty());

        let late = sink_connection("10.0.0.9:7999");
        assert!(matches!(
            server.admit(&late, "late").await,
            Err(RelayError::ConnectionError(_))
        ));
        assert_eq!(server.online_count().await, 0);
    }

    #[tokio::test]
    async fn test_relay_chat_truncates_censors_and_logs() {
        let chat_log = MemoryChatLog::new();
        let config = ServerConfig {
            message_char_limit: 12,
            ..test_config()
        };
        let server = ChatServer::new(config).with_chat_log(Arc::new(chat_log.clone()));
        server.admit(&sink_connection("10.0.0.1:5001"), "alice").await.unwrap();

        assert_eq!(server.relay_chat("alice", "damn, this is way too long", Some("red")).await, 1);

        let history = server.broadcaster().history_snapshot().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "****, this i");
        assert_eq!(history[0].user, "alice");
        assert_eq!(history[0].color.as_deref(), Some("red"));

        let entries = chat_log.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "****, this i");
    }

    #[tokio::test]
    async fn test_profanity_check_can_be_disabled() {
        let config = ServerConfig {
            profanity_check: false,
            ..test_config()
        };
        let server = ChatServer::new(config);
        server.relay_chat("alice", "damn", None).await;

        assert_eq!(server.broadcaster().history_snapshot().await[0].message, "damn");
    }

    #[tokio::test]
    async fn test_custom_filter_and_shared_security_logger() {
        let security = Arc::new(SecurityLogger::new());
        let server = ChatServer::new(test_config())
            .with_profanity_filter(Arc::new(WordListFilter::new(["rust"])))
            .with_security_logger(security.clone());

        server.relay_chat("alice", "I love Rust", None).await;
        server.relay_chat("alice", "damn", None).await;
        let history = server.broadcaster().history_snapshot().await;
        assert_eq!(history[0].message, "I love ****");
        assert_eq!(history[1].message, "damn");

        server.ban_address("10.0.0.1".parse().unwrap()).await;
        server.clear_history().await;
        assert_eq!(security.count("moderation").await, 1);
    }

    #[tokio::test]
    async fn test_kick() {
        let server = ChatServer::new(test_config());
        let bob = sink_connection("10.0.0.1:5001");
        server.admit(&bob, "bob").await.unwrap();

        server.kick("bob").await.unwrap();
        assert!(bob.is_closed());
        assert_eq!(server.online_count().await, 0);

        assert!(matches!(
            server.kick("bob").await,
            Err(RelayError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ban_closes_every_session_from_address() {
        let server = ChatServer::new(test_config());
        let bob = sink_connection("10.0.0.9:5001");
        let bob_alt = sink_connection("10.0.0.9:5002");
        let carol = sink_connection("10.0.0.3:5003");
        server.admit(&bob, "bob").await.unwrap();
        server.admit(&bob_alt, "bobby").await.unwrap();
        server.admit(&carol, "carol").await.unwrap();

        let outcome = server.ban("bob").await.unwrap();
        assert!(outcome.newly_banned);
        assert_eq!(outcome.closed_sessions, 2);
        assert!(bob.is_closed() && bob_alt.is_closed());
        assert!(!carol.is_closed());
        assert_eq!(server.registry().names().await, vec!["carol"]);

        // A banned address cannot slip in through a pending handshake
        let late = sink_connection("10.0.0.9:5004");
        assert!(server.admit(&late, "bobette").await.is_err());
    }

    #[tokio::test]
    async fn test_banning_twice_still_closes_sessions() {
        let server = ChatServer::new(test_config());
        let ip: IpAddr = "10.0.0.9".parse().unwrap();

        let first = server.ban_address(ip).await;
        assert!(first.newly_banned);
        assert_eq!(first.closed_sessions, 0);

        let second = server.ban_address(ip).await;
        assert!(!second.newly_banned);
        assert_eq!(server.bans().len().await, 1);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let server = ChatServer::new(test_config());
        server.admit(&sink_connection("10.0.0.1:5001"), "alice").await.unwrap();
        server.relay_chat("alice", "hello", None).await;

        assert_eq!(server.clear_history().await, 1);
        assert!(server.broadcaster().history_snapshot().await.is_empty());
        assert_eq!(server.security_logger().count("moderation").await, 1);
    }
}
