//! Error handling for GroupWarden
//!
//! This module defines the main error types used throughout the application
//! and provides a unified error handling strategy.

use thiserror::Error;

/// Main error type for GroupWarden application
#[derive(Error, Debug)]
pub enum GroupWardenError {
    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{field} cannot be lower than {minimum}")]
    BelowMinimum { field: &'static str, minimum: u64 },

    #[error("{field} cannot be higher than {maximum}")]
    AboveMaximum { field: &'static str, maximum: u64 },
}

/// Result type alias for GroupWarden operations
pub type Result<T> = std::result::Result<T, GroupWardenError>;

impl GroupWardenError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            GroupWardenError::Telegram(_) => true,
            GroupWardenError::Transport(_) => true,
            GroupWardenError::Config(_) => false,
            GroupWardenError::PermissionDenied(_) => false,
            GroupWardenError::Serialization(_) => false,
            GroupWardenError::Io(_) => true,
            GroupWardenError::UrlParse(_) => false,
            GroupWardenError::InvalidInput(_) => false,
            GroupWardenError::BelowMinimum { .. } => false,
            GroupWardenError::AboveMaximum { .. } => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GroupWardenError::Config(_) => ErrorSeverity::Critical,
            GroupWardenError::PermissionDenied(_) => ErrorSeverity::Warning,
            GroupWardenError::InvalidInput(_) => ErrorSeverity::Info,
            GroupWardenError::BelowMinimum { .. } => ErrorSeverity::Info,
            GroupWardenError::AboveMaximum { .. } => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// Whether the error came from bad admin input and should be shown back to the admin
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            GroupWardenError::InvalidInput(_)
                | GroupWardenError::BelowMinimum { .. }
                | GroupWardenError::AboveMaximum { .. }
        )
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_minimum_message() {
        let err = GroupWardenError::BelowMinimum { field: "kick cooldown", minimum: 300 };
        assert_eq!(err.to_string(), "kick cooldown cannot be lower than 300");
        assert!(err.is_user_facing());
        assert_eq!(err.severity(), ErrorSeverity::Info);
    }

    #[test]
    fn test_transport_errors_are_recoverable() {
        let err = GroupWardenError::Transport("timeout".to_string());
        assert!(err.is_recoverable());
        assert!(!err.is_user_facing());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }
}
