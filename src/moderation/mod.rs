//! Moderation modules
//!
//! Each module is a context object owning its policy store, case registry,
//! admin guard and dispatcher. The [`Moderator`] hands every classified event
//! to the enabled modules in configured order until one of them consumes it.

pub mod anti_anon;
pub mod captcha;
pub mod media_restrict;
pub mod no_info_kick;
pub mod puzzle;
pub mod raid_mode;
pub mod slow_mode;

use std::borrow::Cow;
use std::sync::Arc;
use async_trait::async_trait;
use teloxide::types::{ChatId, UserId};
use tracing::{debug, info, warn};
use crate::config::ModerationConfig;
use crate::handlers::commands;
use crate::models::{ChatEvent, EventKind};
use crate::services::{ActionDispatcher, Transport};
use crate::state::PolicyStore;
use crate::utils::errors::Result;

pub use anti_anon::AntiAnonModule;
pub use captcha::{CaptchaModule, Outcome};
pub use media_restrict::MediaRestrictModule;
pub use no_info_kick::NoInfoKickModule;
pub use puzzle::Puzzle;
pub use raid_mode::RaidModeModule;
pub use slow_mode::SlowModeModule;

/// Whether later modules still see the event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Handled,
    /// Some joiners were removed; later modules see only the rest
    Removed(Vec<UserId>),
}

#[async_trait]
pub trait Module: Send + Sync {
    /// Command name and settings file stem, e.g. `captcha`
    fn name(&self) -> &'static str;

    /// Human-readable name used in replies, e.g. `Media Restrict`
    fn title(&self) -> &'static str;

    fn dispatcher(&self) -> &ActionDispatcher;

    /// May `user_id` change this module's policy from `chat_id`
    async fn authorize(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;

    /// Apply an admin sub-command and return the confirmation to send
    async fn execute(&self, chat_id: ChatId, args: &[String]) -> Result<String>;

    async fn handle_event(&self, event: &ChatEvent) -> Verdict;
}

/// Ordered chain of enabled modules
pub struct Moderator {
    modules: Vec<Arc<dyn Module>>,
}

impl Moderator {
    pub fn new(modules: Vec<Arc<dyn Module>>) -> Self {
        Self { modules }
    }

    /// Load every module named in `config`, in order
    pub async fn from_config(config: &ModerationConfig, transport: Arc<dyn Transport>) -> Self {
        let mut modules: Vec<Arc<dyn Module>> = Vec::with_capacity(config.modules.len());
        let dir = config.settings_dir.as_path();

        for name in &config.modules {
            let module: Arc<dyn Module> = match name.as_str() {
                anti_anon::NAME => Arc::new(AntiAnonModule::new(
                    PolicyStore::load(dir, anti_anon::NAME).await,
                    transport.clone(),
                )),
                raid_mode::NAME => Arc::new(RaidModeModule::new(
                    PolicyStore::load(dir, raid_mode::NAME).await,
                    transport.clone(),
                )),
                no_info_kick::NAME => Arc::new(NoInfoKickModule::new(
                    PolicyStore::load(dir, no_info_kick::NAME).await,
                    transport.clone(),
                )),
                captcha::NAME => Arc::new(CaptchaModule::new(
                    PolicyStore::load(dir, captcha::NAME).await,
                    transport.clone(),
                )),
                slow_mode::NAME => Arc::new(SlowModeModule::new(
                    PolicyStore::load(dir, slow_mode::NAME).await,
                    transport.clone(),
                )),
                media_restrict::NAME => Arc::new(MediaRestrictModule::new(
                    PolicyStore::load(dir, media_restrict::NAME).await,
                    transport.clone(),
                )),
                other => {
                    warn!(module = other, "Unknown module skipped");
                    continue;
                }
            };
            modules.push(module);
        }

        info!(modules = ?config.modules, "Moderation modules loaded");
        Self::new(modules)
    }

    pub fn module(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules.iter().find(|module| module.name() == name)
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    /// Route one event: module commands go to their module, everything else
    /// runs down the chain
    pub async fn handle(&self, event: &ChatEvent) {
        if let EventKind::Command { name, args } = &event.kind {
            if let Some(module) = self.module(name) {
                commands::run_command(module.as_ref(), event, args).await;
                return;
            }
        }

        let mut event = Cow::Borrowed(event);
        for module in &self.modules {
            match module.handle_event(&event).await {
                Verdict::Continue => {}
                Verdict::Handled => {
                    debug!(module = module.name(), chat_id = event.chat_id.0, "Event consumed");
                    break;
                }
                Verdict::Removed(users) => match event.without_members(&users) {
                    Some(rest) => event = Cow::Owned(rest),
                    None => {
                        debug!(module = module.name(), chat_id = event.chat_id.0, "Every joiner removed");
                        break;
                    }
                },
            }
        }
    }
}
