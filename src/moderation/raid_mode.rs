//! Raid mode: while active, every joining member is kicked

use std::sync::Arc;
use async_trait::async_trait;
use teloxide::types::{ChatId, UserId};
use tracing::info;

use super::{Module, Verdict};
use crate::handlers::commands::{self, parse_bool, parse_seconds};
use crate::middleware::AdminGuard;
use crate::models::{ChatEvent, EventKind, Policy, RaidModePolicy};
use crate::services::{ActionDispatcher, Transport};
use crate::state::PolicyStore;
use crate::utils::errors::Result;
use crate::utils::helpers::mention_html;

pub const NAME: &str = "raidmode";
const TITLE: &str = "Raid Mode";

pub struct RaidModeModule {
    policy: PolicyStore<RaidModePolicy>,
    dispatcher: ActionDispatcher,
    admins: AdminGuard,
}

impl RaidModeModule {
    pub fn new(policy: PolicyStore<RaidModePolicy>, transport: Arc<dyn Transport>) -> Self {
        Self {
            policy,
            dispatcher: ActionDispatcher::new(transport.clone(), NAME),
            admins: AdminGuard::new(NAME, transport),
        }
    }

    pub fn policy(&self) -> &PolicyStore<RaidModePolicy> {
        &self.policy
    }
}

#[async_trait]
impl Module for RaidModeModule {
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
        if let Some(result) = commands::common_subcommand(&self.policy, TITLE, chat_id, &sub).await {
            return result;
        }

        let value = args.get(1);
        match sub.as_str() {
            "cooldown" => {
                let secs = parse_seconds(value, "kick cooldown")?;
                self.policy.update(|p| p.set_kick_cooldown(secs)).await?;
                Ok(format!("{} kick cooldown is now {} seconds.", TITLE, secs))
            }
            "feedback" => {
                let feedback = parse_bool(value, "feedback")?;
                self.policy
                    .update(|p| {
                        p.feedback = feedback;
                        Ok(())
                    })
                    .await?;
                Ok(format!("{} feedback is {}.", TITLE, if feedback { "enabled" } else { "disabled" }))
            }
            _ => Ok(commands::usage(
                TITLE,
                NAME,
                &[
                    ("cooldown", "Changes the kick cooldown, in seconds, cannot be lower than 300."),
                    ("feedback", "Announces every kick in the chat, true or false."),
                ],
            )),
        }
    }

    async fn handle_event(&self, event: &ChatEvent) -> Verdict {
        let EventKind::Joined(members) = &event.kind else {
            return Verdict::Continue;
        };
        let policy = self.policy.snapshot().await;
        if !policy.applies_to(event.chat_id) {
            return Verdict::Continue;
        }

        for member in members.iter().filter(|m| !m.is_bot) {
            self.dispatcher.kick(event.chat_id, member.id, policy.cooldown()).await;
            if policy.feedback {
                let notice = format!(
                    "User {} has been kicked due to the chat being in Raid Mode.",
                    mention_html(member.id, &member.display_name)
                );
                self.dispatcher.reply(event.chat_id, &notice).await;
            }
        }
        info!(chat_id = event.chat_id.0, count = members.len(), "Raid mode turned joiners away");
        Verdict::Handled
    }
}
