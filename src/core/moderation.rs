//! Moderation state: the server-wide ban table and the client-local mute list

use std::collections::HashSet;
use std::net::IpAddr;
use tokio::sync::RwLock;

use crate::core::message::Frame;

/// Addresses refused at accept time, kept for the process lifetime
#[derive(Debug, Default)]
pub struct BanTable {
    banned: RwLock<HashSet<IpAddr>>,
}

impl BanTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban an address, returns false if it was already banned
    pub async fn ban(&self, ip: IpAddr) -> bool {
        self.banned.write().await.insert(ip)
    }

    pub async fn is_banned(&self, ip: IpAddr) -> bool {
        self.banned.read().await.contains(&ip)
    }

    pub async fn banned(&self) -> Vec<IpAddr> {
        self.banned.read().await.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.banned.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.banned.read().await.is_empty()
    }
}

/// Names whose messages a viewer has chosen to hide
///
/// Lives on the client; it never changes what other clients see.
#[derive(Debug, Default, Clone)]
pub struct MuteList {
    muted: HashSet<String>,
}

impl MuteList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mute a name, returns false if it was already muted
    pub fn mute(&mut self, name: &str) -> bool {
        self.muted.insert(name.to_string())
    }

    /// Unmute a name, returns false if it was not muted
    pub fn unmute(&mut self, name: &str) -> bool {
        self.muted.remove(name)
    }

    pub fn is_muted(&self, name: &str) -> bool {
        self.muted.contains(name)
    }

    /// Whether an inbound frame should be rendered
    pub fn should_display(&self, frame: &Frame) -> bool {
        !frame.is_chat() || !self.is_muted(&frame.user)
    }

    pub fn muted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.muted.iter().cloned().collect();
        names.sort();
        names
    }
}
