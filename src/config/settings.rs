//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub bot: BotConfig,
    pub moderation: ModerationConfig,
    pub logging: LoggingConfig,
}

/// Telegram bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BotConfig {
    pub token: String,
    /// Alternative Bot API server (e.g. a local `telegram-bot-api` instance)
    pub api_url: Option<String>,
}

/// Moderation module configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Directory holding one `<module>.json` policy file per module
    pub settings_dir: PathBuf,
    /// Enabled modules, in the order they see each message
    pub modules: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: String,
}

/// Names of all modules the moderator knows how to build
pub const KNOWN_MODULES: &[&str] = &[
    "antianon",
    "raidmode",
    "noinfokick",
    "captcha",
    "slowmode",
    "mediarestrict",
];

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_file("config")
    }

    /// Load settings from the given file stem (extension optional) and environment
    pub fn from_file(name: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(
                config::Environment::with_prefix("GROUPWARDEN")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("moderation.modules")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::GroupWardenError> {
        super::validation::validate_settings(self)
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            settings_dir: PathBuf::from("./plugins"),
            modules: KNOWN_MODULES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: "./logs".to_string(),
        }
    }
}
