//! Operator console commands read from the server's standard input

use log::{info, warn};
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::core::server::ChatServer;
use crate::error::RelayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    ClearChat,
    Kick(String),
    Broadcast(String),
    Ban(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminParseError {
    /// A known command was given without its argument
    Usage(&'static str),
    Unknown(String),
}

impl fmt::Display for AdminParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(usage) => write!(f, "Usage: {}", usage),
            Self::Unknown(cmd) => write!(f, "Unknown command: {}", cmd),
        }
    }
}

impl AdminCommand {
    /// Parse a console line, `None` for blank lines
    pub fn parse(line: &str) -> Option<Result<Self, AdminParseError>> {
        let mut args = line.split_whitespace();
        let command = args.next()?;
        let rest: Vec<&str> = args.collect();

        let parsed = match command {
            "//clearchat" => Ok(Self::ClearChat),
            "//kick" => match rest.first() {
                Some(name) => Ok(Self::Kick(name.to_string())),
                None => Err(AdminParseError::Usage("//kick <username>")),
            },
            "//broadcast" => {
                if rest.is_empty() {
                    Err(AdminParseError::Usage("//broadcast <message>"))
                } else {
                    Ok(Self::Broadcast(rest.join(" ")))
                }
            }
            "//ban" => match rest.first() {
                Some(name) => Ok(Self::Ban(name.to_string())),
                None => Err(AdminParseError::Usage("//ban <username>")),
            },
            other => Err(AdminParseError::Unknown(other.to_string())),
        };

        Some(parsed)
    }

    /// Run the command against `server`, returning the line to show the operator
    pub async fn execute(&self, server: &ChatServer) -> String {
        match self {
            Self::ClearChat => {
                server.clear_history().await;
                "Chat cleared.".to_string()
            }
            Self::Kick(name) => match server.kick(name).await {
                Ok(()) => format!("User {} kicked.", name),
                Err(RelayError::SessionNotFound(_)) => "User not found.".to_string(),
                Err(e) => format!("Failed to kick {}: {}", name, e),
            },
            Self::Broadcast(text) => {
                let delivered = server.announce(text).await;
                format!("Broadcast sent to {} users.", delivered)
            }
            Self::Ban(name) => match server.ban(name).await {
                Ok(outcome) if outcome.newly_banned => {
                    format!("User {} banned ({}).", name, outcome.ip)
                }
                Ok(outcome) => format!(
                    "User {} disconnected, {} was already banned.",
                    name, outcome.ip
                ),
                Err(RelayError::SessionNotFound(_)) => "User not found.".to_string(),
                Err(e) => format!("Failed to ban {}: {}", name, e),
            },
        }
    }
}

/// Read commands line by line until the input ends
///
/// Each result line is written to stdout for the operator.
pub async fn run_console<R>(server: &ChatServer, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        };

        match AdminCommand::parse(&line) {
            Some(Ok(command)) => {
                info!("Console command: {:?}", command);
                println!("{}", command.execute(server).await);
            }
            Some(Err(e)) => println!("{}", e),
            None => {}
        }
    }

    info!("Console input closed");
}
