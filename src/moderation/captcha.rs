//! Captcha challenges for new members
//!
//! A joining member is restricted to text and given a puzzle. The challenge
//! ends when the member answers correctly, runs out of attempts, lets the
//! timer expire or leaves the chat. Grading, expiry and abandonment all go
//! through the same per-key lock, so exactly one of them resolves a given
//! challenge and the others find nothing to do.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use teloxide::types::{ChatId, UserId};
use tokio::task::AbortHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::puzzle::Puzzle;
use super::{Module, Verdict};
use crate::handlers::commands::{self, parse_bool, parse_count, parse_seconds};
use crate::middleware::AdminGuard;
use crate::models::{CaptchaPolicy, CaseKey, ChallengeCase, ChatEvent, EventKind, Member, Policy, PuzzleStyle};
use crate::services::{ActionDispatcher, PermissionSet, Transport};
use crate::state::{CaseRegistry, PolicyStore};
use crate::utils::errors::{GroupWardenError, Result};
use crate::utils::helpers::{format_duration, mention_html, normalize_answer, pluralize};
use crate::utils::logging::{log_moderation_action, log_race_lost};

pub const NAME: &str = "captcha";
const TITLE: &str = "Captcha";

/// Result of grading one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Correct; the member is verified
    Accepted,
    /// New puzzle issued; regenerations left
    Regenerated(u32),
    /// Wrong; attempts left
    Rejected(u32),
    /// Wrong with no attempts left; the member was kicked
    Exhausted,
    /// No challenge is pending for this member
    NoChallenge,
}

#[derive(Clone)]
pub struct CaptchaModule {
    policy: Arc<PolicyStore<CaptchaPolicy>>,
    cases: Arc<CaseRegistry<ChallengeCase>>,
    dispatcher: ActionDispatcher,
    admins: Arc<AdminGuard>,
}

impl CaptchaModule {
    pub fn new(policy: PolicyStore<CaptchaPolicy>, transport: Arc<dyn Transport>) -> Self {
        Self {
            policy: Arc::new(policy),
            cases: Arc::new(CaseRegistry::new(NAME)),
            dispatcher: ActionDispatcher::new(transport.clone(), NAME),
            admins: Arc::new(AdminGuard::new(NAME, transport)),
        }
    }

    pub fn policy(&self) -> &PolicyStore<CaptchaPolicy> {
        &self.policy
    }

    pub fn cases(&self) -> &CaseRegistry<ChallengeCase> {
        &self.cases
    }

    /// Challenge `member`. An already pending challenge is kept as is.
    pub async fn issue(&self, chat_id: ChatId, member: &Member) -> bool {
        let policy = self.policy.snapshot().await;
        let key = CaseKey::new(member.id, chat_id);
        let mut guard = self.cases.lock(key).await;

        if guard.find().is_some() {
            debug!(chat_id = chat_id.0, user_id = member.id.0, "Member rejoined with a pending challenge");
            return false;
        }

        let puzzle = Puzzle::generate(policy.puzzle);
        let expires_at = Utc::now() + chrono::Duration::seconds(policy.challenge_timeout as i64);
        let mut case = ChallengeCase::new(puzzle, policy.max_attempts, policy.max_regens, expires_at);

        self.dispatcher.restrict(chat_id, member.id, PermissionSet::Unverified).await;
        let prompt = prompt_text(member, &case.puzzle, policy.puzzle, &policy.regen_keyword, policy.timeout());
        if let Some(message_id) = self.dispatcher.reply(chat_id, &prompt).await {
            case.cleanup.push(message_id);
        }

        case.timer = Some(self.spawn_timer(key, case.id, policy.timeout()));
        guard.create(case);

        log_moderation_action(NAME, chat_id.0, member.id.0, "challenge", None);
        true
    }

    fn spawn_timer(&self, key: CaseKey, challenge_id: Uuid, timeout: Duration) -> AbortHandle {
        let module = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            module.expire(key, challenge_id).await;
        })
        .abort_handle()
    }

    /// Grade `text` as the answer of the event's sender
    pub async fn grade(&self, event: &ChatEvent, text: &str) -> Outcome {
        let key = event.key();
        let chat_id = key.chat_id;
        let policy = self.policy.snapshot().await;
        let mut guard = self.cases.lock(key).await;

        let Some(case) = guard.find() else {
            return Outcome::NoChallenge;
        };

        if case.puzzle.accepts(text) {
            let Some(mut case) = guard.remove() else {
                return Outcome::NoChallenge;
            };
            case.cancel_timer();
            case.cleanup.push(event.message_id);

            self.dispatcher.restore(chat_id, key.user_id).await;
            self.dispatcher.delete_all(chat_id, &case.cleanup).await;
            self.dispatcher
                .reply(
                    chat_id,
                    &format!(
                        "Thank you, {}, please read the rules in our pinned message and enjoy the chat!",
                        mention_html(event.sender.id, &event.sender.display_name)
                    ),
                )
                .await;

            log_moderation_action(NAME, chat_id.0, key.user_id.0, "verified", None);
            return Outcome::Accepted;
        }

        let wants_new = normalize_answer(text) == normalize_answer(&policy.regen_keyword);
        if wants_new && case.regens_left > 0 {
            case.regens_left -= 1;
            case.puzzle = Puzzle::generate(policy.puzzle);
            case.cleanup.push(event.message_id);
            let left = case.regens_left;

            let prompt = prompt_text(&event.sender, &case.puzzle, policy.puzzle, &policy.regen_keyword, policy.timeout());
            if let Some(message_id) = self.dispatcher.reply(chat_id, &prompt).await {
                case.cleanup.push(message_id);
            }
            debug!(chat_id = chat_id.0, user_id = key.user_id.0, regens_left = left, "Puzzle regenerated");
            return Outcome::Regenerated(left);
        }

        case.attempts_left = case.attempts_left.saturating_sub(1);
        if case.attempts_left > 0 {
            case.cleanup.push(event.message_id);
            let left = case.attempts_left;

            let remaining = if left == 1 {
                "this is your last attempt".to_string()
            } else {
                format!("you have {} left", pluralize(left as u64, "attempt"))
            };
            let reply = format!(
                "Sorry, {}, that answer is incorrect, {}, try again!",
                mention_html(event.sender.id, &event.sender.display_name),
                remaining
            );
            if let Some(message_id) = self.dispatcher.reply(chat_id, &reply).await {
                case.cleanup.push(message_id);
            }
            return Outcome::Rejected(left);
        }

        let Some(mut case) = guard.remove() else {
            return Outcome::NoChallenge;
        };
        case.cancel_timer();
        case.cleanup.push(event.message_id);

        self.dispatcher.kick(chat_id, key.user_id, policy.cooldown()).await;
        self.dispatcher.delete_all(chat_id, &case.cleanup).await;

        info!(chat_id = chat_id.0, user_id = key.user_id.0, "Challenge failed, attempts exhausted");
        Outcome::Exhausted
    }

    /// Timer path: kick the member if challenge `challenge_id` is still pending
    pub async fn expire(&self, key: CaseKey, challenge_id: Uuid) -> bool {
        let policy = self.policy.snapshot().await;
        let mut guard = self.cases.lock(key).await;

        let pending = guard.find().map(|case| case.id == challenge_id).unwrap_or(false);
        if !pending {
            log_race_lost(NAME, key.chat_id.0, key.user_id.0, "expire");
            return false;
        }
        let Some(mut case) = guard.remove() else {
            return false;
        };
        // Running inside the timer task itself; aborting would cut the kick short
        case.timer = None;

        self.dispatcher.kick(key.chat_id, key.user_id, policy.cooldown()).await;
        self.dispatcher.delete_all(key.chat_id, &case.cleanup).await;

        info!(chat_id = key.chat_id.0, user_id = key.user_id.0, "Challenge expired");
        true
    }

    /// The member left; drop the challenge and its messages
    pub async fn abandon(&self, key: CaseKey) -> bool {
        let mut guard = self.cases.lock(key).await;
        let Some(mut case) = guard.remove() else {
            return false;
        };
        case.cancel_timer();
        self.dispatcher.delete_all(key.chat_id, &case.cleanup).await;

        debug!(chat_id = key.chat_id.0, user_id = key.user_id.0, "Challenge abandoned");
        true
    }
}

fn prompt_text(member: &Member, puzzle: &Puzzle, style: PuzzleStyle, keyword: &str, timeout: Duration) -> String {
    let mention = mention_html(member.id, &member.display_name);
    let body = match style {
        PuzzleStyle::Arithmetic => format!(
            "Welcome {}, please solve the following arithmetic operation in {}:\n\n<code>{}</code>\n\n\
             Note: results can be negative, don't forget the (-) sign if so.",
            mention,
            format_duration(timeout),
            puzzle.prompt
        ),
        PuzzleStyle::Token => format!(
            "Welcome {}, please type the following code in {}:\n\n<code>{}</code>",
            mention,
            format_duration(timeout),
            puzzle.prompt
        ),
    };
    format!(
        "{}\nSend <code>{}</code> for a different one.",
        body,
        teloxide::utils::html::escape(keyword)
    )
}

#[async_trait]
impl Module for CaptchaModule {
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
            "timeout" => {
                let secs = parse_seconds(value, "challenge timeout")?;
                self.policy.update(|p| p.set_challenge_timeout(secs)).await?;
                Ok(format!("{} challenge timeout is now {} seconds.", TITLE, secs))
            }
            "cooldown" => {
                let secs = parse_seconds(value, "kick cooldown")?;
                self.policy.update(|p| p.set_kick_cooldown(secs)).await?;
                Ok(format!("{} kick cooldown is now {} seconds.", TITLE, secs))
            }
            "strict" => {
                let strict = parse_bool(value, "strict")?;
                self.policy
                    .update(|p| {
                        p.strict = strict;
                        Ok(())
                    })
                    .await?;
                Ok(format!("{} strict is {}.", TITLE, if strict { "enabled" } else { "disabled" }))
            }
            "attempts" => {
                let attempts = parse_count(value, "max attempts")?;
                self.policy.update(|p| p.set_max_attempts(attempts)).await?;
                Ok(format!("{} max attempts is now {}.", TITLE, attempts))
            }
            "regens" => {
                let regens = parse_count(value, "max regens")?;
                self.policy.update(|p| p.set_max_regens(regens)).await?;
                Ok(format!("{} max regens is now {}.", TITLE, regens))
            }
            "puzzle" => {
                let style: PuzzleStyle = value
                    .ok_or_else(|| GroupWardenError::InvalidInput("puzzle value is invalid".to_string()))?
                    .parse()?;
                self.policy
                    .update(|p| {
                        p.puzzle = style;
                        Ok(())
                    })
                    .await?;
                Ok(format!("{} puzzle is now {}.", TITLE, style.as_str()))
            }
            _ => Ok(commands::usage(
                TITLE,
                NAME,
                &[
                    ("timeout", "Changes the challenge timeout, in seconds, cannot be lower than 300."),
                    ("cooldown", "Changes the kick cooldown, in seconds, cannot be lower than 300."),
                    ("strict", "Deletes non-answer messages from challenged members, true or false."),
                    ("attempts", "Changes the max number of attempts, cannot be lower than 1."),
                    ("regens", "Changes the max number of puzzle regenerations, cannot be lower than 1."),
                    ("puzzle", "Changes the puzzle style, arithmetic or token."),
                ],
            )),
        }
    }

    async fn handle_event(&self, event: &ChatEvent) -> Verdict {
        let chat_id = event.chat_id;
        match &event.kind {
            EventKind::Joined(members) => {
                let policy = self.policy.snapshot().await;
                if policy.applies_to(chat_id) {
                    for member in members.iter().filter(|m| !m.is_bot) {
                        self.issue(chat_id, member).await;
                    }
                }
                Verdict::Continue
            }
            EventKind::Left(member) => {
                self.abandon(CaseKey::new(member.id, chat_id)).await;
                Verdict::Continue
            }
            EventKind::Message { .. } | EventKind::Command { .. } => {
                if !self.cases.contains(event.key()).await {
                    return Verdict::Continue;
                }
                if let Some(text) = event.text() {
                    return match self.grade(event, text).await {
                        Outcome::NoChallenge => Verdict::Continue,
                        _ => Verdict::Handled,
                    };
                }

                // Text-less posts and commands are never an answer
                if self.policy.snapshot().await.strict {
                    self.dispatcher.delete_message(chat_id, event.message_id).await;
                    Verdict::Handled
                } else {
                    Verdict::Continue
                }
            }
        }
    }
}
