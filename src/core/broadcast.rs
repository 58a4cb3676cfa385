//! Fan-out of frames to admitted sessions

use log::{debug, warn};
use std::time::Duration;

use crate::core::connection::Connection;
use crate::core::message::Frame;
use crate::core::session::SharedRegistry;
use crate::storage::message_store::SharedHistory;

/// Delivers frames to every admitted session or to a single one by name
pub struct Broadcaster {
    registry: SharedRegistry,
    history: SharedHistory,
    record_history: bool,
    history_pacing: Duration,
}

impl Broadcaster {
    pub fn new(
        registry: SharedRegistry,
        history: SharedHistory,
        record_history: bool,
        history_pacing: Duration,
    ) -> Self {
        Self {
            registry,
            history,
            record_history,
            history_pacing,
        }
    }

    /// Send a frame to every admitted session, returns how many accepted it
    ///
    /// User chat is recorded in the history first when replay is enabled.
    /// A failed write only skips that session.
    pub async fn broadcast(&self, frame: &Frame) -> usize {
        if self.record_history && frame.is_chat() {
            self.history.lock().await.push(frame.clone());
        }

        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode broadcast frame: {}", e);
                return 0;
            }
        };

        let sessions = self.registry.snapshot().await;
        let mut delivered = 0;
        for session in &sessions {
            match session.connection.send_text(text.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "Failed to deliver broadcast to {} ({}): {}",
                    session.name, session.connection.addr, e
                ),
            }
        }

        debug!(
            "Broadcast {} frame to {}/{} sessions",
            frame.kind,
            delivered,
            sessions.len()
        );
        delivered
    }

    /// Send a frame to the admitted session holding `name`
    ///
    /// Returns false when nobody by that name is online or the write failed.
    pub async fn direct_message(&self, name: &str, frame: &Frame) -> bool {
        match self.registry.find_by_name(name).await {
            Some(session) => self.send_to(&session.connection, frame),
            None => {
                debug!("Direct message to unknown user {}", name);
                false
            }
        }
    }

    /// Send a frame to one connection, admitted or not
    pub fn send_to(&self, connection: &Connection, frame: &Frame) -> bool {
        match connection.send_frame(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send {} frame to {}: {}", frame.kind, connection.addr, e);
                false
            }
        }
    }

    /// Write the recorded history to a connection one frame at a time
    ///
    /// Clients read one frame per read, so every frame waits out the pacing
    /// gap first, including the one right after the join notice. Returns the
    /// number of frames written.
    pub async fn replay_history(&self, connection: &Connection) -> usize {
        let frames = self.history.lock().await.snapshot();

        let mut sent = 0;
        for frame in &frames {
            if !self.history_pacing.is_zero() {
                tokio::time::sleep(self.history_pacing).await;
            }
            if !self.send_to(connection, frame) {
                break;
            }
            sent += 1;
        }
        sent
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    pub async fn history_snapshot(&self) -> Vec<Frame> {
        self.history.lock().await.snapshot()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::{create_registry, Session};
    use crate::storage::message_store::create_history;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    fn broadcaster(record_history: bool) -> Broadcaster {
        Broadcaster::new(create_registry(), create_history(10), record_history, Duration::ZERO)
    }

    async fn admit_sink(broadcaster: &Broadcaster, name: &str, port: u16) -> Arc<Connection> {
        let addr = format!("127.0.0.1:{}", port).parse().unwrap();
        let connection = Connection::spawn(tokio::io::sink(), addr);
        broadcaster
            .registry()
            .admit(Session::new(connection.clone(), name))
            .await
            .unwrap();
        connection
    }

    async fn read_frames(mut client: tokio::io::DuplexStream) -> Vec<Frame> {
        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        serde_json::Deserializer::from_slice(&raw)
            .into_iter::<Frame>()
            .map(|f| f.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let broadcaster = broadcaster(true);
        admit_sink(&broadcaster, "alice", 6001).await;
        admit_sink(&broadcaster, "bob", 6002).await;

        assert_eq!(broadcaster.broadcast(&Frame::chat("alice", "hi", None)).await, 2);
        assert_eq!(broadcaster.history_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_is_skipped() {
        let broadcaster = broadcaster(false);
        let alice = admit_sink(&broadcaster, "alice", 6001).await;
        admit_sink(&broadcaster, "bob", 6002).await;
        alice.close();

        assert_eq!(broadcaster.broadcast(&Frame::notice("maintenance")).await, 1);
    }

    #[tokio::test]
    async fn test_only_user_chat_is_recorded() {
        let broadcaster = broadcaster(true);
        broadcaster.broadcast(&Frame::notice("alice has joined the chat")).await;
        broadcaster.broadcast(&Frame::chat("alice", "hello", None)).await;
        broadcaster.broadcast(&Frame::pong()).await;

        let history = broadcaster.history_snapshot().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "hello");

        broadcaster.clear_history().await;
        assert!(broadcaster.history_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_disabled_records_nothing() {
        let broadcaster = broadcaster(false);
        broadcaster.broadcast(&Frame::chat("alice", "hello", None)).await;
        assert!(broadcaster.history_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_direct_message() {
        let broadcaster = broadcaster(false);
        let (client, server) = tokio::io::duplex(1024);
        let connection = Connection::spawn(server, "127.0.0.1:6001".parse().unwrap());
        broadcaster
            .registry()
            .admit(Session::new(connection.clone(), "alice"))
            .await
            .unwrap();

        assert!(broadcaster.direct_message("alice", &Frame::notice("psst")).await);
        assert!(!broadcaster.direct_message("carol", &Frame::notice("psst")).await);
        connection.close();

        let frames = read_frames(client).await;
        assert_eq!(frames, vec![Frame::notice("psst")]);
    }

    #[tokio::test]
    async fn test_replay_waits_before_first_frame() {
        let broadcaster = Broadcaster::new(
            create_registry(),
            create_history(10),
            true,
            Duration::from_millis(200),
        );
        broadcaster.broadcast(&Frame::chat("alice", "hello", None)).await;

        let (mut client, server) = tokio::io::duplex(1024);
        let connection = Connection::spawn(server, "127.0.0.1:6003".parse().unwrap());
        connection.send_frame(&Frame::notice("bob has joined the chat")).unwrap();

        let replay = tokio::spawn({
            let connection = connection.clone();
            async move { broadcaster.replay_history(&connection).await }
        });

        // Only the notice is readable until the pacing gap has passed
        let mut buf = [0u8; 1024];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(Frame::decode(&buf[..n]).unwrap(), Frame::notice("bob has joined the chat"));
        let early = tokio::time::timeout(Duration::from_millis(50), client.read(&mut buf)).await;
        assert!(early.is_err());

        assert_eq!(replay.await.unwrap(), 1);
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(Frame::decode(&buf[..n]).unwrap().message, "hello");
    }

    #[tokio::test]
    async fn test_replay_preserves_order() {
        let broadcaster = broadcaster(true);
        for i in 0..3 {
            broadcaster
                .broadcast(&Frame::chat("alice", &format!("message {}", i), None))
                .await;
        }

        let (client, server) = tokio::io::duplex(4096);
        let connection = Connection::spawn(server, "127.0.0.1:6002".parse().unwrap());
        assert_eq!(broadcaster.replay_history(&connection).await, 3);
        connection.close();

        let messages: Vec<String> = read_frames(client).await.into_iter().map(|f| f.message).collect();
        assert_eq!(messages, vec!["message 0", "message 1", "message 2"]);
    }
}
