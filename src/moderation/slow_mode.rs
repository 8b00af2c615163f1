//! Message burst throttling

use std::sync::Arc;
use async_trait::async_trait;
use teloxide::types::{ChatId, UserId};
use tokio::time::Instant;
use tracing::debug;

use super::{Module, Verdict};
use crate::handlers::commands::{self, parse_count, parse_seconds};
use crate::middleware::AdminGuard;
use crate::models::{ChatEvent, EventKind, Policy, SlowCase, SlowModePolicy};
use crate::services::{ActionDispatcher, PermissionSet, Transport};
use crate::state::{CaseRegistry, PolicyStore};
use crate::utils::errors::{GroupWardenError, Result};
use crate::utils::helpers::{format_duration, mention_html};

pub const NAME: &str = "slowmode";
const TITLE: &str = "Slow Mode";

/// Advance `case` by one message at `now`; returns true when the member
/// should be muted. The counter is reset in that case.
pub fn advance(case: &mut SlowCase, policy: &SlowModePolicy, now: Instant) -> bool {
    let gap = now.saturating_duration_since(case.last_event);
    case.last_event = now;

    if gap <= policy.interval() {
        case.counter += 1;
    } else {
        case.counter = case.counter.saturating_sub(1);
    }

    if case.counter >= policy.max_messages {
        case.counter = 0;
        return true;
    }
    false
}

pub struct SlowModeModule {
    policy: PolicyStore<SlowModePolicy>,
    cases: CaseRegistry<SlowCase>,
    dispatcher: ActionDispatcher,
    admins: AdminGuard,
}

impl SlowModeModule {
    pub fn new(policy: PolicyStore<SlowModePolicy>, transport: Arc<dyn Transport>) -> Self {
        Self {
            policy,
            cases: CaseRegistry::new(NAME),
            dispatcher: ActionDispatcher::new(transport.clone(), NAME),
            admins: AdminGuard::new(NAME, transport),
        }
    }

    pub fn policy(&self) -> &PolicyStore<SlowModePolicy> {
        &self.policy
    }

    pub fn cases(&self) -> &CaseRegistry<SlowCase> {
        &self.cases
    }

    /// Count one message; mutes the sender when the burst limit is reached
    pub async fn observe(&self, event: &ChatEvent) -> bool {
        let policy = self.policy.snapshot().await;
        let now = Instant::now();

        let mut guard = self.cases.lock(event.key()).await;
        let case = guard.find_or_create_with(|| SlowCase::new(now));
        if !advance(case, &policy, now) {
            return false;
        }

        let chat_id = event.chat_id;
        debug!(chat_id = chat_id.0, user_id = event.sender.id.0, "Burst limit reached");
        self.dispatcher
            .mute(chat_id, event.sender.id, PermissionSet::Muted, policy.mute_duration())
            .await;
        let notice = format!(
            "{} is posting too many messages too fast, they have been muted for {}",
            mention_html(event.sender.id, &event.sender.display_name),
            format_duration(policy.mute_duration())
        );
        self.dispatcher.reply(chat_id, &notice).await;
        true
    }
}

#[async_trait]
impl Module for SlowModeModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn title(&self) -> &'static str {
        TITLE
    }

    fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Checked against the live member status rather than the cached list
    async fn authorize(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        if self.admins.is_privileged_now(chat_id, user_id).await {
            Ok(())
        } else {
            Err(GroupWardenError::PermissionDenied(format!("user {} is not a chat administrator", user_id.0)))
        }
    }

    async fn execute(&self, chat_id: ChatId, args: &[String]) -> Result<String> {
        let sub = args.first().map(|s| s.to_lowercase()).unwrap_or_default();
        if let Some(result) = commands::common_subcommand(&self.policy, TITLE, chat_id, &sub).await {
            return result;
        }

        let value = args.get(1);
        match sub.as_str() {
            "mute" => {
                let secs = parse_seconds(value, "muting time")?;
                self.policy.update(|p| p.set_muting_time(secs)).await?;
                Ok(format!("{} muting time is now {} seconds.", TITLE, secs))
            }
            "interval" => {
                let secs = parse_seconds(value, "posting interval")?;
                self.policy.update(|p| p.set_posting_interval(secs)).await?;
                Ok(format!("{} posting interval is now {} seconds.", TITLE, secs))
            }
            "messages" => {
                let count = parse_count(value, "max messages")?;
                self.policy.update(|p| p.set_max_messages(count)).await?;
                Ok(format!("{} max messages is now {}.", TITLE, count))
            }
            _ => Ok(commands::usage(
                TITLE,
                NAME,
                &[
                    ("mute", "Changes the muting time, in seconds, cannot be lower than 300."),
                    ("interval", "Changes the gap, in seconds, under which messages count as a burst, cannot be lower than 1."),
                    ("messages", "Changes how many burst messages trigger a mute, cannot be lower than 2."),
                ],
            )),
        }
    }

    async fn handle_event(&self, event: &ChatEvent) -> Verdict {
        if !matches!(event.kind, EventKind::Message { .. } | EventKind::Command { .. }) || event.sender.is_bot {
            return Verdict::Continue;
        }
        if !self.policy.snapshot().await.applies_to(event.chat_id) {
            return Verdict::Continue;
        }

        if self.observe(event).await {
            Verdict::Handled
        } else {
            Verdict::Continue
        }
    }
}
