//! Per-connection protocol loop: handshake, then chat until the stream ends

use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::core::connection::Connection;
use crate::core::handshake::{
    spawn_watchdog, validate_handshake, CompletionSignal, HandshakePhase, HandshakeRejection,
    WatchdogOutcome,
};
use crate::core::message::{Frame, FrameType};
use crate::core::rate_limiter::MessageRateLimiter;
use crate::core::server::SharedChatServer;
use crate::error::RelayError;
use crate::security_logger::SecurityEvent;

const RATE_LIMIT_NOTICE: &str = "You are sending messages too fast, please wait a bit.";

/// Whether the loop keeps reading after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// State owned by one session task
struct SessionState {
    connection: Arc<Connection>,
    signal: Arc<CompletionSignal>,
    phase: HandshakePhase,
    limiter: MessageRateLimiter,
}

impl SessionState {
    fn admitted_name(&self) -> Option<&str> {
        match &self.phase {
            HandshakePhase::Admitted { name } => Some(name),
            HandshakePhase::AwaitingHandshake => None,
        }
    }
}

/// Drive one client connection from accept to close
///
/// Each read is treated as exactly one frame. Reads that are not JSON are
/// skipped; JSON that is not a frame ends the session.
pub async fn handle_connection(server: SharedChatServer, stream: TcpStream, addr: SocketAddr) {
    let (mut reader, writer) = stream.into_split();
    let connection = Connection::spawn(writer, addr);
    info!("Client connected: {}", addr);

    let config = server.config();
    let offer = Frame::handshake_offer(
        &config.server_name,
        config.message_char_limit,
        config.password_protected,
    );
    if let Err(e) = connection.send_frame(&offer) {
        warn!("Failed to send handshake to {}: {}", addr, e);
        connection.close();
        return;
    }

    let signal = CompletionSignal::new();
    let watchdog = spawn_watchdog(signal.clone(), connection.clone(), config.handshake_timeout);

    let mut state = SessionState {
        connection: connection.clone(),
        signal: signal.clone(),
        phase: HandshakePhase::AwaitingHandshake,
        limiter: MessageRateLimiter::new(config.rate_limit_max_messages, config.rate_limit_window),
    };
    let mut buf = vec![0u8; config.read_buffer_size];

    loop {
        let read = tokio::select! {
            result = reader.read(&mut buf) => result,
            _ = connection.closed() => break,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Read from {} failed: {}", addr, e);
                break;
            }
        };

        let value: serde_json::Value = match serde_json::from_slice(&buf[..n]) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping invalid JSON from {}: {}", addr, e);
                server
                    .security_logger()
                    .log_event(SecurityEvent::ProtocolViolation {
                        name: state.admitted_name().map(str::to_string),
                        ip: addr.ip(),
                        details: format!("invalid JSON: {}", e),
                    })
                    .await;
                continue;
            }
        };

        // A bare null carries no type, treat it like any unknown frame
        if value.is_null() {
            debug!("Ignoring null frame from {}", addr);
            continue;
        }

        let frame: Frame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Malformed frame from {}, closing: {}", addr, e);
                break;
            }
        };

        if dispatch(&server, &mut state, frame).await == Flow::Close {
            break;
        }
    }

    server.drop_session(connection.id).await;
    connection.close();

    // Settle the race so the watchdog exits now rather than at its deadline
    signal.complete();
    if let Ok(WatchdogOutcome::TimedOut) = watchdog.await {
        server
            .security_logger()
            .log_event(SecurityEvent::HandshakeTimeout { ip: addr.ip() })
            .await;
    }

    info!("Client disconnected: {}", addr);
}

async fn dispatch(server: &SharedChatServer, state: &mut SessionState, frame: Frame) -> Flow {
    match &frame.kind {
        FrameType::Handshake => handle_handshake(server, state, &frame).await,
        FrameType::Message => {
            handle_chat(server, state, &frame).await;
            Flow::Continue
        }
        FrameType::Ping => {
            if let Err(e) = state.connection.send_frame(&Frame::pong()) {
                debug!("Failed to answer ping from {}: {}", state.connection.addr, e);
            }
            Flow::Continue
        }
        other => {
            debug!(
                "Ignoring frame of type '{}' from {}",
                other, state.connection.addr
            );
            Flow::Continue
        }
    }
}

async fn handle_handshake(server: &SharedChatServer, state: &mut SessionState, frame: &Frame) -> Flow {
    if state.admitted_name().is_some() {
        return Flow::Continue;
    }

    let addr = state.connection.addr;
    let name = match validate_handshake(frame, server.config()) {
        Ok(name) => name,
        Err(rejection) => return reject(server, state, frame, rejection).await,
    };

    // The watchdog already fired and closed us
    if !state.signal.complete() {
        return Flow::Close;
    }

    let admitted = server.admit(&state.connection, &name).await;
    match admitted {
        Ok(()) => {
            state.phase = HandshakePhase::Admitted { name };
            Flow::Continue
        }
        Err(RelayError::DuplicateName(_)) => {
            reject(server, state, frame, HandshakeRejection::NameInUse).await
        }
        Err(e) => {
            warn!("Failed to admit {} ({}): {}", name, addr, e);
            Flow::Close
        }
    }
}

async fn reject(
    server: &SharedChatServer,
    state: &SessionState,
    frame: &Frame,
    rejection: HandshakeRejection,
) -> Flow {
    let ip = state.connection.addr.ip();
    let event = if rejection.closes_connection() {
        SecurityEvent::AuthenticationFailed {
            name: Some(frame.user.clone()).filter(|n| !n.is_empty()),
            ip,
            reason: rejection.to_string(),
        }
    } else {
        SecurityEvent::ProtocolViolation {
            name: None,
            ip,
            details: rejection.to_string(),
        }
    };
    server.security_logger().log_event(event).await;

    if let Some(reply) = rejection.reply() {
        if let Err(e) = state.connection.send_frame(&reply) {
            debug!("Failed to send rejection to {}: {}", state.connection.addr, e);
        }
    }

    if rejection.closes_connection() {
        Flow::Close
    } else {
        Flow::Continue
    }
}

async fn handle_chat(server: &SharedChatServer, state: &mut SessionState, frame: &Frame) {
    let Some(name) = state.admitted_name().map(str::to_string) else {
        debug!("Dropping message from unadmitted {}", state.connection.addr);
        return;
    };

    if !state.limiter.allow_message() {
        server
            .security_logger()
            .log_event(SecurityEvent::RateLimitExceeded {
                name: name.clone(),
                ip: state.connection.addr.ip(),
            })
            .await;
        if let Err(e) = state.connection.send_frame(&Frame::notice(RATE_LIMIT_NOTICE)) {
            debug!("Failed to send rate limit notice to {}: {}", name, e);
        }
        return;
    }

    if frame.message.is_empty() {
        return;
    }

    server
        .relay_chat(&name, &frame.message, frame.color.as_deref())
        .await;
}
