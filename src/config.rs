//! Server configuration module
//! Handles the JSON config file, environment overrides and validation

use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHAT_LOG_PATH, DEFAULT_CONFIG_PATH, DEFAULT_HISTORY_CAPACITY, DEFAULT_HOST,
    DEFAULT_MESSAGE_CHAR_LIMIT, DEFAULT_PORT, DEFAULT_SERVER_NAME, HANDSHAKE_TIMEOUT_SECS,
    HISTORY_PACING_MS, MAX_MESSAGE_CHAR_LIMIT, MAX_SERVER_NAME_LEN, MIN_MESSAGE_CHAR_LIMIT,
    RATE_LIMIT_MAX_MESSAGES, RATE_LIMIT_WINDOW_SECS, READ_BUFFER_SIZE, WELCOME_DELAY_MS,
};
use crate::error::{RelayError, Result};

/// Server configuration parameters
///
/// The serialized fields mirror the `config.json` surface shared with
/// existing deployments. Tuning knobs are code/env only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Display name sent in the handshake
    pub server_name: String,
    /// Maximum characters per chat message, longer messages are truncated
    pub message_char_limit: usize,
    /// Append accepted chat messages to the chat log file
    pub log_messages: bool,
    pub password_protected: bool,
    pub server_password: String,
    /// Replay recent history to newly admitted sessions
    pub send_message_history: bool,
    pub profanity_check: bool,

    #[serde(skip)]
    pub handshake_timeout: Duration,
    #[serde(skip)]
    pub history_capacity: usize,
    #[serde(skip)]
    pub rate_limit_window: Duration,
    #[serde(skip)]
    pub rate_limit_max_messages: usize,
    #[serde(skip)]
    pub read_buffer_size: usize,
    /// Delay between replayed history frames
    #[serde(skip)]
    pub history_pacing: Duration,
    /// Grace period between the join notice and the welcome message
    #[serde(skip)]
    pub welcome_delay: Duration,
    #[serde(skip)]
    pub chat_log_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            server_name: DEFAULT_SERVER_NAME.to_string(),
            message_char_limit: DEFAULT_MESSAGE_CHAR_LIMIT,
            log_messages: false,
            password_protected: false,
            server_password: String::new(),
            send_message_history: true,
            profanity_check: true,
            handshake_timeout: Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            rate_limit_window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            rate_limit_max_messages: RATE_LIMIT_MAX_MESSAGES,
            read_buffer_size: READ_BUFFER_SIZE,
            history_pacing: Duration::from_millis(HISTORY_PACING_MS),
            welcome_delay: Duration::from_millis(WELCOME_DELAY_MS),
            chat_log_path: DEFAULT_CHAT_LOG_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load the config file, creating it with defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                RelayError::ConfigError(format!(
                    "failed to decode config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Config file '{}' not found, creating one", path.display());
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(RelayError::ConfigError(format!(
                "failed to open config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write the serialized surface of this config as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let encoded = serde_json::to_string_pretty(self)?;
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Path of the config file, `TCHAT_CONFIG` or the default
    pub fn path_from_env() -> String {
        env::var("TCHAT_CONFIG").unwrap_or(DEFAULT_CONFIG_PATH.to_string())
    }

    /// Override loaded values with environment variables if available
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("TCHAT_HOST") {
            self.host = host;
        }

        if let Some(port) = env::var("TCHAT_PORT").ok().and_then(|p| p.parse().ok()) {
            self.port = port;
        }

        if let Ok(name) = env::var("TCHAT_SERVER_NAME") {
            self.server_name = name;
        }

        if let Some(limit) = env::var("TCHAT_MESSAGE_CHAR_LIMIT")
            .ok()
            .and_then(|l| l.parse().ok())
        {
            self.message_char_limit = limit;
        }

        if let Ok(password) = env::var("TCHAT_SERVER_PASSWORD") {
            self.password_protected = !password.is_empty();
            self.server_password = password;
        }

        if let Ok(flag) = env::var("TCHAT_LOG_MESSAGES") {
            self.log_messages = flag.to_lowercase() == "true" || flag == "1";
        }

        if let Some(secs) = env::var("TCHAT_HANDSHAKE_TIMEOUT")
            .ok()
            .and_then(|t| t.parse().ok())
        {
            self.handshake_timeout = Duration::from_secs(secs);
        }
    }

    /// Check every constraint and report all violations at once
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.port == 0 {
            problems.push("port must be between 1 and 65535".to_string());
        }

        if self.server_name.chars().count() > MAX_SERVER_NAME_LEN {
            problems.push(format!(
                "serverName must be at most {} characters",
                MAX_SERVER_NAME_LEN
            ));
        }

        if !(MIN_MESSAGE_CHAR_LIMIT..=MAX_MESSAGE_CHAR_LIMIT).contains(&self.message_char_limit) {
            problems.push(format!(
                "messageCharLimit must be between {} and {}",
                MIN_MESSAGE_CHAR_LIMIT, MAX_MESSAGE_CHAR_LIMIT
            ));
        }

        if self.password_protected && self.server_password.is_empty() {
            problems.push(
                "serverPassword must not be empty when passwordProtected is true".to_string(),
            );
        }

        if !self.password_protected && !self.server_password.is_empty() {
            problems.push("serverPassword is set but passwordProtected is false".to_string());
        }

        if self.history_capacity == 0 {
            problems.push("history capacity must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RelayError::ConfigError(problems.join("\n")))
        }
    }
}
