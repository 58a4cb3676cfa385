pub mod chat_log;
pub mod memory;
pub mod message_store;
pub mod traits;

pub use chat_log::FileChatLog;
pub use memory::MemoryChatLog;
pub use message_store::{create_history, HistoryBuffer, SharedHistory};
pub use traits::{ChatLog, LoggedMessage};
