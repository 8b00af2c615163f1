//! GroupWarden Telegram Bot
//!
//! A Telegram bot that keeps group chats free of spam accounts and floods.
//! Each moderation module (join captcha, media scoring, slow mode, raid mode,
//! anti-anon, no-info kick) keeps its own per-chat policy file and reacts to
//! classified chat events through a shared action dispatcher.

#![allow(non_snake_case)]

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod moderation;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{GroupWardenError, Result};

// Re-export main components for easy access
pub use moderation::Moderator;
pub use services::{TelegramTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
