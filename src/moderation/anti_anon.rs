//! Removes posts made on behalf of a linked channel

use std::sync::Arc;
use async_trait::async_trait;
use teloxide::types::{ChatId, UserId};

use super::{Module, Verdict};
use crate::handlers::commands;
use crate::middleware::AdminGuard;
use crate::models::{AntiAnonPolicy, ChatEvent, Policy};
use crate::services::{ActionDispatcher, Transport};
use crate::state::PolicyStore;
use crate::utils::errors::Result;
use crate::utils::logging::log_moderation_action;

pub const NAME: &str = "antianon";
const TITLE: &str = "Anti Anon";

pub struct AntiAnonModule {
    policy: PolicyStore<AntiAnonPolicy>,
    dispatcher: ActionDispatcher,
    admins: AdminGuard,
}

impl AntiAnonModule {
    pub fn new(policy: PolicyStore<AntiAnonPolicy>, transport: Arc<dyn Transport>) -> Self {
        Self {
            policy,
            dispatcher: ActionDispatcher::new(transport.clone(), NAME),
            admins: AdminGuard::new(NAME, transport),
        }
    }
}

#[async_trait]
impl Module for AntiAnonModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn title(&self) -> &'static str {
        TITLE
    }

    fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    async fn authorize(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.admins.check_admin_auth(chat_id, user_id).await
    }

    async fn execute(&self, chat_id: ChatId, args: &[String]) -> Result<String> {
        let sub = args.first().map(|s| s.to_lowercase()).unwrap_or_default();
        match commands::common_subcommand(&self.policy, TITLE, chat_id, &sub).await {
            Some(result) => result,
            None => Ok(commands::usage(TITLE, NAME, &[])),
        }
    }

    async fn handle_event(&self, event: &ChatEvent) -> Verdict {
        if !event.is_from_channel() || !event.is_message() {
            return Verdict::Continue;
        }
        if !self.policy.snapshot().await.applies_to(event.chat_id) {
            return Verdict::Continue;
        }

        if self.dispatcher.delete_message(event.chat_id, event.message_id).await {
            log_moderation_action(NAME, event.chat_id.0, event.sender.id.0, "delete", Some("channel post"));
        }
        Verdict::Handled
    }
}
