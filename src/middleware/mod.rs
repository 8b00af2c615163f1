//! Middleware module
//!
//! Cross-cutting checks applied before a module acts on a command

pub mod auth;

pub use auth::AdminGuard;
