//! Media posting score
//!
//! Every post from a regular member moves a per-member score: enough media
//! posts raise it, enough plain posts lower it. Reaching the restriction
//! score mutes the member to text only for a while.

use std::sync::Arc;
use async_trait::async_trait;
use teloxide::types::{ChatId, UserId};
use tracing::debug;

use super::{Module, Verdict};
use crate::handlers::commands::{self, parse_bool, parse_count, parse_seconds};
use crate::middleware::AdminGuard;
use crate::models::{ChatEvent, ContentKind, EventKind, MediaRestrictPolicy, Policy, ScoreCase};
use crate::services::{ActionDispatcher, PermissionSet, Transport};
use crate::state::{CaseRegistry, PolicyStore};
use crate::utils::errors::{GroupWardenError, Result};
use crate::utils::helpers::{format_duration, mention_html};

pub const NAME: &str = "mediarestrict";
const TITLE: &str = "Media Restrict";

const REASON_SCORE: &str = "posting too much media";
const REASON_FIRST_MEDIA: &str = "first seen post by bot was media";

/// What one event did to a score case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreStep {
    pub score: u32,
    /// Set when the restriction score was reached; holds the reason
    pub restrict: Option<&'static str>,
}

/// Advance `case` by one event classified as `is_media`.
///
/// The first-post flag is settled by the first media post or by the first
/// time the plain-post threshold is reached, whichever comes first. A
/// triggered restriction resets the score to zero.
pub fn advance(case: &mut ScoreCase, policy: &MediaRestrictPolicy, is_media: bool) -> ScoreStep {
    let mut reason = REASON_SCORE;

    if is_media {
        case.media_counter += 1;
        if case.media_counter >= policy.max_media {
            case.score += 1;
            case.media_counter = 0;
        }
        let first = std::mem::replace(&mut case.first_post_pending, false);
        if first && policy.first_media {
            case.score = case.score.max(policy.restrict_score);
            reason = REASON_FIRST_MEDIA;
        }
    } else {
        case.message_counter += 1;
        if case.message_counter >= policy.max_messages {
            case.score = case.score.saturating_sub(1);
            case.message_counter = 0;
            case.first_post_pending = false;
        }
    }

    if case.score >= policy.restrict_score {
        case.score = 0;
        return ScoreStep { score: 0, restrict: Some(reason) };
    }
    ScoreStep { score: case.score, restrict: None }
}

pub struct MediaRestrictModule {
    policy: PolicyStore<MediaRestrictPolicy>,
    cases: CaseRegistry<ScoreCase>,
    dispatcher: ActionDispatcher,
    admins: AdminGuard,
}

impl MediaRestrictModule {
    pub fn new(policy: PolicyStore<MediaRestrictPolicy>, transport: Arc<dyn Transport>) -> Self {
        Self {
            policy,
            cases: CaseRegistry::new(NAME),
            dispatcher: ActionDispatcher::new(transport.clone(), NAME),
            admins: AdminGuard::new(NAME, transport),
        }
    }

    pub fn policy(&self) -> &PolicyStore<MediaRestrictPolicy> {
        &self.policy
    }

    pub fn cases(&self) -> &CaseRegistry<ScoreCase> {
        &self.cases
    }

    /// Score one post and restrict the sender if the threshold is reached
    pub async fn observe(&self, event: &ChatEvent) -> ScoreStep {
        let policy = self.policy.snapshot().await;
        let is_media = policy.is_media(event.contents());

        let mut guard = self.cases.lock(event.key()).await;
        let case = guard.find_or_create_with(ScoreCase::default);
        let step = advance(case, &policy, is_media);
        debug!(chat_id = event.chat_id.0, user_id = event.sender.id.0, is_media, score = step.score, "Media score updated");

        if let Some(reason) = step.restrict {
            let chat_id = event.chat_id;
            self.dispatcher
                .mute(chat_id, event.sender.id, PermissionSet::TextOnly, policy.mute_duration())
                .await;
            self.dispatcher.delete_message(chat_id, event.message_id).await;
            if policy.feedback {
                let notice = format!(
                    "{} has been restricted for: <code>{}</code> for: <code>{}</code>",
                    mention_html(event.sender.id, &event.sender.display_name),
                    reason,
                    format_duration(policy.mute_duration())
                );
                self.dispatcher.reply(chat_id, &notice).await;
            }
        }
        step
    }
}

#[async_trait]
impl Module for MediaRestrictModule {
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
            "feedback" => {
                let feedback = parse_bool(value, "feedback")?;
                self.policy
                    .update(|p| {
                        p.feedback = feedback;
                        Ok(())
                    })
                    .await?;
                Ok(if feedback {
                    format!("{} will start providing feedback.", TITLE)
                } else {
                    format!("{} will stop providing feedback.", TITLE)
                })
            }
            "mute" => {
                let secs = parse_seconds(value, "muting time")?;
                self.policy.update(|p| p.set_muting_time(secs)).await?;
                Ok(format!("{} muting time is now {} seconds.", TITLE, secs))
            }
            "first" => {
                let first = parse_bool(value, "first")?;
                self.policy
                    .update(|p| {
                        p.first_media = first;
                        Ok(())
                    })
                    .await?;
                Ok(format!(
                    "{} will {}restrict users if their first seen message is media.",
                    TITLE,
                    if first { "" } else { "not " }
                ))
            }
            "score" => {
                let score = parse_count(value, "max score")?;
                self.policy.update(|p| p.set_restrict_score(score)).await?;
                Ok(format!("{} max score is now {}.", TITLE, score))
            }
            "media" => {
                let count = parse_count(value, "max media")?;
                self.policy.update(|p| p.set_max_media(count)).await?;
                Ok(format!("{} max media is now {}.", TITLE, count))
            }
            "messages" => {
                let count = parse_count(value, "max messages")?;
                self.policy.update(|p| p.set_max_messages(count)).await?;
                Ok(format!("{} max messages is now {}.", TITLE, count))
            }
            "check" => {
                let kind: ContentKind = value
                    .ok_or_else(|| GroupWardenError::InvalidInput("check option is invalid".to_string()))?
                    .parse()
                    .map_err(|_| GroupWardenError::InvalidInput("check option is invalid".to_string()))?;
                let counted = self.policy.update(|p| Ok(p.toggle_check(kind))).await?;
                Ok(format!(
                    "{} will {}count {} as media posts.",
                    TITLE,
                    if counted { "" } else { "not " },
                    kind
                ))
            }
            _ => {
                let kinds = ContentKind::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ");
                let check = format!("Switches whether a content kind counts as media: {}.", kinds);
                Ok(commands::usage(
                    TITLE,
                    NAME,
                    &[
                        ("feedback", "Announces restrictions in the chat, true or false."),
                        ("mute", "Changes the muting time, in seconds, cannot be lower than 300."),
                        ("first", "Restricts users whose first seen post is media, true or false."),
                        ("score", "Changes the score that triggers a restriction, cannot be lower than 1."),
                        ("media", "Changes how many media posts raise the score by one, cannot be lower than 1."),
                        ("messages", "Changes how many text posts lower the score by one, cannot be lower than 1."),
                        ("check", &check),
                    ],
                ))
            }
        }
    }

    async fn handle_event(&self, event: &ChatEvent) -> Verdict {
        if !matches!(event.kind, EventKind::Message { .. }) || event.sender.is_bot {
            return Verdict::Continue;
        }
        if !self.policy.snapshot().await.applies_to(event.chat_id) {
            return Verdict::Continue;
        }
        if self.admins.is_admin(event.chat_id, event.sender.id).await {
            return Verdict::Continue;
        }

        match self.observe(event).await.restrict {
            Some(_) => Verdict::Handled,
            None => Verdict::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(max_media: u32, max_messages: u32, restrict_score: u32, first_media: bool) -> MediaRestrictPolicy {
        MediaRestrictPolicy {
            max_media,
            max_messages,
            restrict_score,
            first_media,
            ..MediaRestrictPolicy::default()
        }
    }

    #[test]
    fn test_first_media_post_restricts_at_once() {
        let policy = policy(3, 1, 5, true);
        let mut case = ScoreCase::default();

        let step = advance(&mut case, &policy, true);

        assert_eq!(step.restrict, Some(REASON_FIRST_MEDIA));
        assert_eq!(case.score, 0);
        assert!(!case.first_post_pending);
    }

    #[test]
    fn test_first_media_only_counts_for_the_very_first_event() {
        let policy = policy(1, 1, 5, true);
        let mut case = ScoreCase::default();

        advance(&mut case, &policy, false);
        let step = advance(&mut case, &policy, true);

        assert_eq!(step, ScoreStep { score: 1, restrict: None });
    }

    #[test]
    fn test_plain_posts_below_threshold_keep_first_post_pending() {
        let policy = policy(1, 3, 5, true);
        let mut case = ScoreCase::default();

        assert_eq!(advance(&mut case, &policy, false).restrict, None);
        assert!(case.first_post_pending);
        let step = advance(&mut case, &policy, true);

        assert_eq!(step.restrict, Some(REASON_FIRST_MEDIA));
        assert!(!case.first_post_pending);
    }

    #[test]
    fn test_reaching_plain_post_threshold_settles_first_post() {
        let policy = policy(1, 3, 5, true);
        let mut case = ScoreCase::default();

        for _ in 0..3 {
            advance(&mut case, &policy, false);
        }
        assert!(!case.first_post_pending);
        assert_eq!(advance(&mut case, &policy, true), ScoreStep { score: 1, restrict: None });
    }

    #[test]
    fn test_media_threshold_counts_posts() {
        let policy = policy(2, 1, 5, false);
        let mut case = ScoreCase::default();

        assert_eq!(advance(&mut case, &policy, true).score, 0);
        assert_eq!(advance(&mut case, &policy, true).score, 1);
        assert_eq!(case.media_counter, 0);
    }

    proptest! {
        #[test]
        fn score_never_goes_negative(events in proptest::collection::vec(any::<bool>(), 0..64)) {
            let policy = policy(1, 1, 1000, false);
            let mut case = ScoreCase::default();
            let mut expected: u32 = 0;
            for is_media in events {
                let step = advance(&mut case, &policy, is_media);
                expected = if is_media { expected + 1 } else { expected.saturating_sub(1) };
                prop_assert_eq!(step.score, expected);
            }
        }

        #[test]
        fn one_restriction_per_threshold_crossing(media_posts in 1u32..60, restrict_score in 1u32..10) {
            let policy = policy(1, 1, restrict_score, false);
            let mut case = ScoreCase::default();
            let restrictions = (0..media_posts)
                .filter(|_| advance(&mut case, &policy, true).restrict.is_some())
                .count() as u32;
            prop_assert_eq!(restrictions, media_posts / restrict_score);
            prop_assert_eq!(case.score, media_posts % restrict_score);
        }
    }
}
