//! Bot handlers module
//!
//! - Message handlers classify updates and feed the moderation chain
//! - Command handlers parse and apply admin sub-commands

pub mod commands;
pub mod messages;

use teloxide::types::UserId;

/// Id of the bot account itself, resolved with `getMe` at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotIdentity(pub UserId);

// Re-export commonly used handler functions
pub use commands::{parse_command, run_command};
pub use messages::{classify, handle_message};
