//! Registry of admitted sessions, the source of truth for who is online

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::connection::{Connection, ConnectionId};
use crate::error::{RelayError, Result};

/// An admitted client: its connection plus the identity it was admitted with
#[derive(Clone)]
pub struct Session {
    pub connection: Arc<Connection>,
    pub name: String,
    pub admitted_at: DateTime<Utc>,
}

impl Session {
    pub fn new(connection: Arc<Connection>, name: impl Into<String>) -> Self {
        Self {
            connection,
            name: name.into(),
            admitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id
    }

    pub fn ip(&self) -> IpAddr {
        self.connection.addr.ip()
    }
}

// Manages admitted sessions keyed by their connection
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session unless its name is already taken
    ///
    /// The name check and the insert happen under one write lock, so two
    /// racing admissions for the same name cannot both succeed.
    pub async fn admit(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if sessions.values().any(|s| s.name == session.name) {
            return Err(RelayError::DuplicateName(session.name));
        }

        sessions.insert(session.id(), session);
        Ok(())
    }

    /// Remove a session, returns it if it was present
    pub async fn remove(&self, id: ConnectionId) -> Option<Session> {
        self.sessions.write().await.remove(&id)
    }

    /// Copy of the current sessions, safe to iterate while others mutate
    pub async fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Session> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.name == name)
            .cloned()
    }

    /// All sessions connected from the given address
    pub async fn sessions_from(&self, ip: IpAddr) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.ip() == ip)
            .cloned()
            .collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }
}

// Thread-safe registry handle
pub type SharedRegistry = Arc<SessionRegistry>;

pub fn create_registry() -> SharedRegistry {
    Arc::new(SessionRegistry::new())
}
