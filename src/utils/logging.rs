//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the GroupWarden application.

use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::LoggingConfig;
use crate::utils::errors::{GroupWardenError, Result};

/// Initialize logging based on configuration.
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.file_path, "groupwarden.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .map_err(|e| GroupWardenError::Config(format!("Failed to install subscriber: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log a moderation action taken against a member
pub fn log_moderation_action(module: &str, chat_id: i64, user_id: u64, action: &str, details: Option<&str>) {
    info!(
        module = module,
        chat_id = chat_id,
        user_id = user_id,
        action = action,
        details = details,
        "Moderation action performed"
    );
}

/// Log admin actions
pub fn log_admin_action(module: &str, admin_id: u64, action: &str, details: Option<&str>) {
    warn!(
        module = module,
        admin_id = admin_id,
        action = action,
        details = details,
        "Admin action performed"
    );
}

/// Log API errors with context
pub fn log_api_error(module: &str, api: &str, error: &GroupWardenError, context: Option<&str>) {
    error!(
        module = module,
        api = api,
        error = %error,
        severity = %error.severity(),
        recoverable = error.is_recoverable(),
        context = context,
        "[{}] API error occurred", module
    );
}

/// Log settings persistence operations
pub fn log_settings_operation(module: &str, operation: &str, success: bool, details: Option<&str>) {
    if success {
        debug!(
            module = module,
            operation = operation,
            "Settings operation completed"
        );
    } else {
        error!(
            module = module,
            operation = operation,
            details = details,
            "[{}] Settings operation failed", module
        );
    }
}

/// Log a race lost between a timer and a manual resolution
pub fn log_race_lost(module: &str, chat_id: i64, user_id: u64, path: &str) {
    debug!(
        module = module,
        chat_id = chat_id,
        user_id = user_id,
        path = path,
        "Case already resolved, nothing to do"
    );
}
