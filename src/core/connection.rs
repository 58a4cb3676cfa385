//! Stream connection management
//! Handles the write side and the lifetime of client connections

use log::{debug, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::constants::{OUTBOUND_QUEUE_CAPACITY, WRITE_TIMEOUT_SECS};
use crate::core::message::Frame;
use crate::error::{RelayError, Result};

pub type ConnectionId = Uuid;

/// Write handle for a single client stream
///
/// Frames are queued to a dedicated writer task so a slow client never
/// blocks whoever is sending to it. The queue is bounded: a client that
/// lets it fill up is closed. Closing wakes the reader, flushes queued
/// frames and shuts the stream down. The writer also closes the connection
/// when a write fails or stalls.
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    sender: mpsc::Sender<String>,
    closed: Arc<watch::Sender<bool>>,
    pub connected_at: Instant,
}

impl Connection {
    /// Create a connection and spawn the task that owns the write half
    pub fn spawn<W>(writer: W, addr: SocketAddr) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, outbound) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let closed = Arc::new(watch::Sender::new(false));

        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            addr,
            sender,
            closed: closed.clone(),
            connected_at: Instant::now(),
        });

        tokio::spawn(write_loop(writer, outbound, closed, connection.id));
        connection
    }

    /// Serialize and queue a frame
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        let text = frame.encode()?;
        self.send_text(text)
    }

    /// Queue an already encoded frame
    pub fn send_text(&self, text: String) -> Result<()> {
        if self.is_closed() {
            return Err(RelayError::ConnectionClosed);
        }

        match self.sender.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue full for client {} ({}), closing",
                    self.id, self.addr
                );
                self.close();
                Err(RelayError::ConnectionError("outbound queue full".to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Failed to send frame to client {} ({})", self.id, self.addr);
                Err(RelayError::ConnectionClosed)
            }
        }
    }

    /// Close the connection, returns true for the call that closed it
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the connection has been closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        wait_closed(&mut rx).await;
    }

    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    loop {
        let closed = *rx.borrow_and_update();
        if closed {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Write one frame, false once the stream is unusable
async fn write_frame<W>(writer: &mut W, text: &str, id: ConnectionId) -> bool
where
    W: AsyncWrite + Unpin,
{
    let deadline = Duration::from_secs(WRITE_TIMEOUT_SECS);
    match tokio::time::timeout(deadline, writer.write_all(text.as_bytes())).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("Write to connection {} failed: {}", id, e);
            false
        }
        Err(_) => {
            warn!("Write to connection {} timed out", id);
            false
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<String>,
    closed: Arc<watch::Sender<bool>>,
    id: ConnectionId,
) where
    W: AsyncWrite + Unpin,
{
    let mut closed_rx = closed.subscribe();
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if !write_frame(&mut writer, &text, id).await {
                        break;
                    }
                }
                None => break,
            },
            _ = wait_closed(&mut closed_rx) => {
                // Frames queued before the close still go out
                while let Ok(text) = outbound.try_recv() {
                    if !write_frame(&mut writer, &text, id).await {
                        break;
                    }
                }
                break;
            }
        }
    }

    // The reader must stop too once nothing can be written
    closed.send_replace(true);
    outbound.close();
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of connection {} failed: {}", id, e);
    }
}
