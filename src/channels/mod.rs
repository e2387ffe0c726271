//! Message channels — transports the bot listens and replies on.

pub mod channel;
pub mod cli;
pub mod manager;
pub mod telegram;

pub use channel::{Channel, IncomingMessage, MessageStream, OutgoingResponse, StatusUpdate};
pub use cli::CliChannel;
pub use manager::ChannelManager;
pub use telegram::TelegramChannel;
