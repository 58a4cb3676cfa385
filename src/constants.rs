// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9076;
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";
pub const DEFAULT_SERVER_NAME: &str = "an tchat server";
pub const DEFAULT_MESSAGE_CHAR_LIMIT: usize = 180;
pub const DEFAULT_CHAT_LOG_PATH: &str = "chat.log";

// Limits enforced on the configuration surface
pub const MAX_SERVER_NAME_LEN: usize = 25;
pub const MIN_MESSAGE_CHAR_LIMIT: usize = 1;
pub const MAX_MESSAGE_CHAR_LIMIT: usize = 1000;

// Handshake protocol
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 5;
pub const HANDSHAKE_ACK: &str = "OK";
pub const HANDSHAKE_START: &str = "HandshakeStart";
pub const RESERVED_NAME: &str = "server";
pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 20;

// Rate limiting: max messages per window per session
pub const RATE_LIMIT_WINDOW_SECS: u64 = 5;
pub const RATE_LIMIT_MAX_MESSAGES: usize = 10;

// History replay
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
pub const HISTORY_PACING_MS: u64 = 10;
pub const WELCOME_DELAY_MS: u64 = 100;

// Transport
pub const READ_BUFFER_SIZE: usize = 1024;
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;
pub const WRITE_TIMEOUT_SECS: u64 = 10;
