//! Kicks joiners with an empty profile
//!
//! A joiner failing enough of the enabled checks is kicked once. If the same
//! account joins again it is let through, on the assumption that a person and
//! not a script came back.

use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use teloxide::types::{ChatId, UserId};
use tracing::debug;

use super::{Module, Verdict};
use crate::handlers::commands::{self, parse_bool, parse_count, parse_seconds};
use crate::middleware::AdminGuard;
use crate::models::{CaseKey, ChatEvent, EventKind, KickRecord, Member, NoInfoKickPolicy, Policy};
use crate::services::{ActionDispatcher, Transport};
use crate::state::{CaseRegistry, PolicyStore};
use crate::utils::errors::{GroupWardenError, Result};
use crate::utils::helpers::{format_duration, mention_html};
use crate::utils::logging::log_api_error;

pub const NAME: &str = "noinfokick";
const TITLE: &str = "No Info Kick";

pub struct NoInfoKickModule {
    policy: PolicyStore<NoInfoKickPolicy>,
    kicked: CaseRegistry<KickRecord>,
    dispatcher: ActionDispatcher,
    admins: AdminGuard,
}

impl NoInfoKickModule {
    pub fn new(policy: PolicyStore<NoInfoKickPolicy>, transport: Arc<dyn Transport>) -> Self {
        Self {
            policy,
            kicked: CaseRegistry::new(NAME),
            dispatcher: ActionDispatcher::new(transport.clone(), NAME),
            admins: AdminGuard::new(NAME, transport),
        }
    }

    pub fn policy(&self) -> &PolicyStore<NoInfoKickPolicy> {
        &self.policy
    }

    /// Number of enabled checks `member` fails
    async fn failed_checks(&self, member: &Member, policy: &NoInfoKickPolicy) -> u32 {
        let mut fails = 0;
        if policy.check_username && member.username.is_none() {
            fails += 1;
        }
        if policy.check_picture {
            match self.dispatcher.transport().profile_photo_count(member.id).await {
                Ok(0) => fails += 1,
                Ok(_) => {}
                Err(e) => log_api_error(NAME, "profile_photo_count", &e, Some(&format!("user {}", member.id.0))),
            }
        }
        if policy.check_bio {
            match self.dispatcher.transport().has_bio(member.id).await {
                Ok(false) => fails += 1,
                Ok(true) => {}
                Err(e) => log_api_error(NAME, "has_bio", &e, Some(&format!("user {}", member.id.0))),
            }
        }
        fails
    }

    /// Screen one joiner; returns true if they were kicked
    pub async fn screen(&self, chat_id: ChatId, member: &Member, policy: &NoInfoKickPolicy) -> bool {
        let fails = self.failed_checks(member, policy).await;
        let mut guard = self.kicked.lock(CaseKey::new(member.id, chat_id)).await;

        if fails < policy.tolerance || guard.find().is_some() {
            if guard.remove().is_some() {
                debug!(chat_id = chat_id.0, user_id = member.id.0, "Previously kicked member let through");
            }
            return false;
        }

        self.dispatcher.kick(chat_id, member.id, policy.cooldown()).await;
        guard.create(KickRecord { kicked_at: Utc::now() });

        if policy.feedback {
            let notice = format!(
                "User {} has been kicked under suspicion of being an userbot.\n\n\
                 If they aren't an userbot, they may attempt to rejoin in {}.",
                mention_html(member.id, &member.display_name),
                format_duration(policy.cooldown())
            );
            self.dispatcher.reply(chat_id, &notice).await;
        }
        true
    }
}

#[async_trait]
impl Module for NoInfoKickModule {
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
            "tolerance" => {
                let tolerance = parse_count(value, "tolerance")?;
                self.policy.update(|p| p.set_tolerance(tolerance)).await?;
                Ok(format!("{} tolerance is now {}.", TITLE, tolerance))
            }
            "check" => {
                let check = value.map(|v| v.to_lowercase()).unwrap_or_default();
                let enabled = self
                    .policy
                    .update(|p| {
                        let flag = match check.as_str() {
                            "username" => &mut p.check_username,
                            "picture" => &mut p.check_picture,
                            "bio" => &mut p.check_bio,
                            _ => return Err(GroupWardenError::InvalidInput("check option is invalid".to_string())),
                        };
                        *flag = !*flag;
                        Ok(*flag)
                    })
                    .await?;
                Ok(format!(
                    "{} will {}check the {} of new members.",
                    TITLE,
                    if enabled { "" } else { "not " },
                    check
                ))
            }
            _ => Ok(commands::usage(
                TITLE,
                NAME,
                &[
                    ("cooldown", "Changes the kick cooldown, in seconds, cannot be lower than 300."),
                    ("feedback", "Announces every kick in the chat, true or false."),
                    ("tolerance", "Changes how many failed checks trigger a kick, from 1 to 3."),
                    ("check", "Switches the username, picture or bio check."),
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

        let mut kicked = Vec::new();
        for member in members.iter().filter(|m| !m.is_bot) {
            if self.screen(event.chat_id, member, &policy).await {
                kicked.push(member.id);
            }
        }

        if kicked.is_empty() {
            Verdict::Continue
        } else {
            Verdict::Removed(kicked)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{RecordingTransport, TransportCall};

    #[tokio::test]
    async fn test_kicked_once_then_let_through() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let module = NoInfoKickModule::new(PolicyStore::load(dir.path(), NAME).await, transport.clone());
        let policy = module.policy().snapshot().await;
        let member = Member::new(UserId(5), "Blank");

        assert!(module.screen(ChatId(-1), &member, &policy).await);
        assert!(!module.screen(ChatId(-1), &member, &policy).await);
        assert!(module.screen(ChatId(-1), &member, &policy).await);
        assert_eq!(transport.kicks().await.len(), 2);
    }

    #[tokio::test]
    async fn test_complete_profile_passes() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        transport.set_photo_count(UserId(5), 2);
        let module = NoInfoKickModule::new(PolicyStore::load(dir.path(), NAME).await, transport.clone());
        let policy = module.policy().snapshot().await;
        let mut member = Member::new(UserId(5), "Filled");
        member.username = Some("filled".to_string());

        assert!(!module.screen(ChatId(-1), &member, &policy).await);
        assert!(transport.kicks().await.is_empty());
    }

    #[tokio::test]
    async fn test_tolerance_of_one() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        transport.set_photo_count(UserId(5), 1);
        let module = NoInfoKickModule::new(PolicyStore::load(dir.path(), NAME).await, transport.clone());
        module.policy().update(|p| p.set_tolerance(1)).await.unwrap();
        let policy = module.policy().snapshot().await;

        assert!(module.screen(ChatId(-1), &Member::new(UserId(5), "NoHandle"), &policy).await);
    }

    #[tokio::test]
    async fn test_missing_bio_counts_as_a_failed_check() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        transport.set_photo_count(UserId(5), 1);
        let module = NoInfoKickModule::new(PolicyStore::load(dir.path(), NAME).await, transport.clone());
        let policy = module.policy().snapshot().await;

        // No username and no bio
        assert!(module.screen(ChatId(-1), &Member::new(UserId(5), "NoBio"), &policy).await);

        transport.set_bio(UserId(6));
        transport.set_photo_count(UserId(6), 1);
        assert!(!module.screen(ChatId(-1), &Member::new(UserId(6), "HasBio"), &policy).await);
    }

    #[tokio::test]
    async fn test_bio_check_can_be_switched_off() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        transport.set_photo_count(UserId(5), 1);
        let module = NoInfoKickModule::new(PolicyStore::load(dir.path(), NAME).await, transport.clone());

        let reply = module.execute(ChatId(-1), &["check".to_string(), "bio".to_string()]).await.unwrap();
        assert!(reply.contains("will not check the bio"));
        let policy = module.policy().snapshot().await;

        assert!(!module.screen(ChatId(-1), &Member::new(UserId(5), "NoHandle"), &policy).await);
        assert!(!transport.calls().await.iter().any(|call| matches!(call, TransportCall::HasBio { .. })));
    }

    #[tokio::test]
    async fn test_tolerance_of_three_needs_every_check_to_fail() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        transport.set_photo_count(UserId(5), 1);
        let module = NoInfoKickModule::new(PolicyStore::load(dir.path(), NAME).await, transport.clone());
        module.policy().update(|p| p.set_tolerance(3)).await.unwrap();
        let policy = module.policy().snapshot().await;

        assert!(!module.screen(ChatId(-1), &Member::new(UserId(5), "HasPicture"), &policy).await);
        assert!(module.screen(ChatId(-1), &Member::new(UserId(6), "Blank"), &policy).await);
    }

    #[tokio::test]
    async fn test_only_kicked_joiners_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new());
        transport.set_photo_count(UserId(6), 1);
        transport.set_bio(UserId(6));
        let module = NoInfoKickModule::new(PolicyStore::load(dir.path(), NAME).await, transport.clone());
        let event = ChatEvent::new(
            ChatId(-1),
            teloxide::types::MessageId(1),
            Member::new(UserId(5), "Blank"),
            EventKind::Joined(vec![Member::new(UserId(5), "Blank"), Member::new(UserId(6), "Filled")]),
        );

        assert_eq!(module.handle_event(&event).await, Verdict::Removed(vec![UserId(5)]));
    }
}
