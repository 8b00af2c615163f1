//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use std::collections::HashSet;
use crate::utils::errors::{GroupWardenError, Result};
use super::settings::KNOWN_MODULES;
use super::Settings;

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_bot_config(&settings.bot)?;
    validate_moderation_config(&settings.moderation)?;
    validate_logging_config(&settings.logging)?;

    Ok(())
}

/// Validate bot configuration
fn validate_bot_config(config: &super::BotConfig) -> Result<()> {
    if config.token.is_empty() {
        return Err(GroupWardenError::Config(
            "Bot token is required".to_string()
        ));
    }

    if let Some(ref api_url) = config.api_url {
        url::Url::parse(api_url)?;
    }

    Ok(())
}

/// Validate moderation configuration
fn validate_moderation_config(config: &super::ModerationConfig) -> Result<()> {
    if config.settings_dir.as_os_str().is_empty() {
        return Err(GroupWardenError::Config(
            "Settings directory is required".to_string()
        ));
    }

    let mut seen = HashSet::new();
    for module in &config.modules {
        if !KNOWN_MODULES.contains(&module.as_str()) {
            return Err(GroupWardenError::Config(
                format!("Unknown module: {}. Known modules: {:?}", module, KNOWN_MODULES)
            ));
        }
        if !seen.insert(module.as_str()) {
            return Err(GroupWardenError::Config(
                format!("Module listed twice: {}", module)
            ));
        }
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(GroupWardenError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(GroupWardenError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}
