//! Admin-editable moderation policies
//!
//! One serde record per module, persisted as `<module>.json`. Every numeric
//! field has a minimum enforced by its setter; a rejected value leaves the
//! policy untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;

use super::event::ContentKind;
use crate::utils::errors::{GroupWardenError, Result};

/// Minimum for every timeout, cooldown and mute duration, in seconds
pub const MIN_DURATION_SECS: u64 = 300;
pub const MIN_ATTEMPTS: u32 = 1;
pub const MIN_REGENS: u32 = 1;
pub const MIN_THRESHOLD: u32 = 1;
pub const MIN_POSTING_INTERVAL_SECS: u64 = 1;
pub const MIN_SLOW_MESSAGES: u32 = 2;
pub const MAX_TOLERANCE: u32 = 3;

/// Behavior shared by all module policies
pub trait Policy: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn is_active(&self) -> bool;
    fn set_active(&mut self, active: bool);
    fn excluded(&self) -> &BTreeSet<i64>;
    fn excluded_mut(&mut self) -> &mut BTreeSet<i64>;

    /// Check every numeric field against its minimum, e.g. after loading a
    /// hand-edited settings file
    fn validate(&self) -> Result<()>;

    /// Active and not opted out by this chat
    fn applies_to(&self, chat_id: ChatId) -> bool {
        self.is_active() && !self.excluded().contains(&chat_id.0)
    }

    /// Flip the chat's exclusion; returns true when the chat is now excluded
    fn toggle_exclusion(&mut self, chat_id: ChatId) -> bool {
        let excluded = self.excluded_mut();
        if excluded.remove(&chat_id.0) {
            false
        } else {
            excluded.insert(chat_id.0);
            true
        }
    }

    /// Human-readable dump used by `/<module> settings`
    fn render(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

macro_rules! impl_policy {
    ($ty:ty) => {
        impl Policy for $ty {
            fn is_active(&self) -> bool {
                self.active
            }

            fn set_active(&mut self, active: bool) {
                self.active = active;
            }

            fn excluded(&self) -> &BTreeSet<i64> {
                &self.exclude
            }

            fn excluded_mut(&mut self) -> &mut BTreeSet<i64> {
                &mut self.exclude
            }

            fn validate(&self) -> Result<()> {
                self.check_ranges()
            }
        }
    };
}

fn at_least_u64(field: &'static str, value: u64, minimum: u64) -> Result<u64> {
    if value < minimum {
        return Err(GroupWardenError::BelowMinimum { field, minimum });
    }
    Ok(value)
}

fn at_least_u32(field: &'static str, value: u32, minimum: u32) -> Result<u32> {
    if value < minimum {
        return Err(GroupWardenError::BelowMinimum { field, minimum: minimum as u64 });
    }
    Ok(value)
}

/// Puzzle flavor issued to new members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleStyle {
    #[default]
    Arithmetic,
    Token,
}

impl PuzzleStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PuzzleStyle::Arithmetic => "arithmetic",
            PuzzleStyle::Token => "token",
        }
    }
}

impl std::str::FromStr for PuzzleStyle {
    type Err = GroupWardenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "arithmetic" | "math" => Ok(PuzzleStyle::Arithmetic),
            "token" | "text" => Ok(PuzzleStyle::Token),
            other => Err(GroupWardenError::InvalidInput(format!(
                "unknown puzzle style: {}, expected arithmetic or token",
                other
            ))),
        }
    }
}

/// Captcha challenge policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaPolicy {
    pub active: bool,
    /// Seconds a new member has to answer before being kicked
    pub challenge_timeout: u64,
    /// Seconds a kicked member must wait before rejoining
    pub kick_cooldown: u64,
    /// Delete posts from challenged members that are not answers
    pub strict: bool,
    pub max_attempts: u32,
    pub max_regens: u32,
    pub puzzle: PuzzleStyle,
    /// Keyword a member sends to get a fresh puzzle
    pub regen_keyword: String,
    pub exclude: BTreeSet<i64>,
}

impl Default for CaptchaPolicy {
    fn default() -> Self {
        Self {
            active: true,
            challenge_timeout: 1800,
            kick_cooldown: 300,
            strict: true,
            max_attempts: 3,
            max_regens: 3,
            puzzle: PuzzleStyle::Arithmetic,
            regen_keyword: "new".to_string(),
            exclude: BTreeSet::new(),
        }
    }
}

impl_policy!(CaptchaPolicy);

impl CaptchaPolicy {
    pub fn set_challenge_timeout(&mut self, secs: u64) -> Result<()> {
        self.challenge_timeout = at_least_u64("challenge timeout", secs, MIN_DURATION_SECS)?;
        Ok(())
    }

    pub fn set_kick_cooldown(&mut self, secs: u64) -> Result<()> {
        self.kick_cooldown = at_least_u64("kick cooldown", secs, MIN_DURATION_SECS)?;
        Ok(())
    }

    pub fn set_max_attempts(&mut self, attempts: u32) -> Result<()> {
        self.max_attempts = at_least_u32("max attempts", attempts, MIN_ATTEMPTS)?;
        Ok(())
    }

    pub fn set_max_regens(&mut self, regens: u32) -> Result<()> {
        self.max_regens = at_least_u32("max regens", regens, MIN_REGENS)?;
        Ok(())
    }

    fn check_ranges(&self) -> Result<()> {
        at_least_u64("challenge timeout", self.challenge_timeout, MIN_DURATION_SECS)?;
        at_least_u64("kick cooldown", self.kick_cooldown, MIN_DURATION_SECS)?;
        at_least_u32("max attempts", self.max_attempts, MIN_ATTEMPTS)?;
        at_least_u32("max regens", self.max_regens, MIN_REGENS)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.kick_cooldown)
    }
}

/// Media-posting score policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaRestrictPolicy {
    pub active: bool,
    /// Announce restrictions in the chat
    pub feedback: bool,
    pub muting_time: u64,
    /// Restrict at once when the first post seen from a member is media
    pub first_media: bool,
    pub restrict_score: u32,
    /// Media posts needed to raise the score by one
    pub max_media: u32,
    /// Non-media posts needed to lower the score by one
    pub max_messages: u32,
    pub checks: BTreeMap<ContentKind, bool>,
    pub exclude: BTreeSet<i64>,
}

impl Default for MediaRestrictPolicy {
    fn default() -> Self {
        Self {
            active: true,
            feedback: true,
            muting_time: 86400,
            first_media: true,
            restrict_score: 5,
            max_media: 1,
            max_messages: 1,
            checks: ContentKind::ALL
                .iter()
                .map(|kind| (*kind, kind.counted_by_default()))
                .collect(),
            exclude: BTreeSet::new(),
        }
    }
}

impl_policy!(MediaRestrictPolicy);

impl MediaRestrictPolicy {
    /// Whether `kind` currently counts toward the media score
    pub fn counts(&self, kind: ContentKind) -> bool {
        self.checks.get(&kind).copied().unwrap_or_else(|| kind.counted_by_default())
    }

    /// A post is media iff any of its detected signals is counted
    pub fn is_media(&self, contents: &[ContentKind]) -> bool {
        contents.iter().any(|kind| self.counts(*kind))
    }

    /// Flip one content-kind toggle; returns the new value
    pub fn toggle_check(&mut self, kind: ContentKind) -> bool {
        let value = !self.counts(kind);
        self.checks.insert(kind, value);
        value
    }

    pub fn set_muting_time(&mut self, secs: u64) -> Result<()> {
        self.muting_time = at_least_u64("muting time", secs, MIN_DURATION_SECS)?;
        Ok(())
    }

    pub fn set_restrict_score(&mut self, score: u32) -> Result<()> {
        self.restrict_score = at_least_u32("max score", score, MIN_THRESHOLD)?;
        Ok(())
    }

    pub fn set_max_media(&mut self, count: u32) -> Result<()> {
        self.max_media = at_least_u32("max media", count, MIN_THRESHOLD)?;
        Ok(())
    }

    pub fn set_max_messages(&mut self, count: u32) -> Result<()> {
        self.max_messages = at_least_u32("max messages", count, MIN_THRESHOLD)?;
        Ok(())
    }

    fn check_ranges(&self) -> Result<()> {
        at_least_u64("muting time", self.muting_time, MIN_DURATION_SECS)?;
        at_least_u32("max score", self.restrict_score, MIN_THRESHOLD)?;
        at_least_u32("max media", self.max_media, MIN_THRESHOLD)?;
        at_least_u32("max messages", self.max_messages, MIN_THRESHOLD)?;
        Ok(())
    }

    pub fn mute_duration(&self) -> Duration {
        Duration::from_secs(self.muting_time)
    }
}

/// Message-burst throttling policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlowModePolicy {
    pub active: bool,
    pub muting_time: u64,
    /// Gaps up to this many seconds count as a burst
    pub posting_interval: u64,
    pub max_messages: u32,
    pub exclude: BTreeSet<i64>,
}

impl Default for SlowModePolicy {
    fn default() -> Self {
        Self {
            active: true,
            muting_time: 300,
            posting_interval: 1,
            max_messages: 10,
            exclude: BTreeSet::new(),
        }
    }
}

impl_policy!(SlowModePolicy);

impl SlowModePolicy {
    pub fn set_muting_time(&mut self, secs: u64) -> Result<()> {
        self.muting_time = at_least_u64("muting time", secs, MIN_DURATION_SECS)?;
        Ok(())
    }

    pub fn set_posting_interval(&mut self, secs: u64) -> Result<()> {
        self.posting_interval = at_least_u64("posting interval", secs, MIN_POSTING_INTERVAL_SECS)?;
        Ok(())
    }

    pub fn set_max_messages(&mut self, count: u32) -> Result<()> {
        self.max_messages = at_least_u32("max messages", count, MIN_SLOW_MESSAGES)?;
        Ok(())
    }

    fn check_ranges(&self) -> Result<()> {
        at_least_u64("muting time", self.muting_time, MIN_DURATION_SECS)?;
        at_least_u64("posting interval", self.posting_interval, MIN_POSTING_INTERVAL_SECS)?;
        at_least_u32("max messages", self.max_messages, MIN_SLOW_MESSAGES)?;
        Ok(())
    }

    pub fn mute_duration(&self) -> Duration {
        Duration::from_secs(self.muting_time)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.posting_interval)
    }
}

/// Kick-every-joiner policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaidModePolicy {
    pub active: bool,
    pub kick_cooldown: u64,
    pub feedback: bool,
    pub exclude: BTreeSet<i64>,
}

impl Default for RaidModePolicy {
    fn default() -> Self {
        Self {
            active: false,
            kick_cooldown: 300,
            feedback: false,
            exclude: BTreeSet::new(),
        }
    }
}

impl_policy!(RaidModePolicy);

impl RaidModePolicy {
    pub fn set_kick_cooldown(&mut self, secs: u64) -> Result<()> {
        self.kick_cooldown = at_least_u64("kick cooldown", secs, MIN_DURATION_SECS)?;
        Ok(())
    }

    fn check_ranges(&self) -> Result<()> {
        at_least_u64("kick cooldown", self.kick_cooldown, MIN_DURATION_SECS)?;
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.kick_cooldown)
    }
}

/// Channel-post removal policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiAnonPolicy {
    pub active: bool,
    pub exclude: BTreeSet<i64>,
}

impl Default for AntiAnonPolicy {
    fn default() -> Self {
        Self {
            active: true,
            exclude: BTreeSet::new(),
        }
    }
}

impl_policy!(AntiAnonPolicy);

impl AntiAnonPolicy {
    fn check_ranges(&self) -> Result<()> {
        Ok(())
    }
}

/// Empty-profile joiner policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoInfoKickPolicy {
    pub active: bool,
    pub kick_cooldown: u64,
    pub check_username: bool,
    pub check_picture: bool,
    pub check_bio: bool,
    pub feedback: bool,
    /// Failed checks needed for a kick
    pub tolerance: u32,
    pub exclude: BTreeSet<i64>,
}

impl Default for NoInfoKickPolicy {
    fn default() -> Self {
        Self {
            active: true,
            kick_cooldown: 300,
            check_username: true,
            check_picture: true,
            check_bio: true,
            feedback: true,
            tolerance: 2,
            exclude: BTreeSet::new(),
        }
    }
}

impl_policy!(NoInfoKickPolicy);

impl NoInfoKickPolicy {
    pub fn set_kick_cooldown(&mut self, secs: u64) -> Result<()> {
        self.kick_cooldown = at_least_u64("kick cooldown", secs, MIN_DURATION_SECS)?;
        Ok(())
    }

    pub fn set_tolerance(&mut self, tolerance: u32) -> Result<()> {
        self.tolerance = tolerance_in_range(tolerance)?;
        Ok(())
    }

    fn check_ranges(&self) -> Result<()> {
        at_least_u64("kick cooldown", self.kick_cooldown, MIN_DURATION_SECS)?;
        tolerance_in_range(self.tolerance)?;
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.kick_cooldown)
    }
}

fn tolerance_in_range(tolerance: u32) -> Result<u32> {
    let tolerance = at_least_u32("tolerance", tolerance, MIN_THRESHOLD)?;
    if tolerance > MAX_TOLERANCE {
        return Err(GroupWardenError::AboveMaximum {
            field: "tolerance",
            maximum: MAX_TOLERANCE as u64,
        });
    }
    Ok(tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_below_minimum_cooldown_keeps_prior_value() {
        let mut policy = CaptchaPolicy::default();
        policy.set_kick_cooldown(600).unwrap();

        let result = policy.set_kick_cooldown(100);

        assert_matches!(result, Err(GroupWardenError::BelowMinimum { minimum: 300, .. }));
        assert_eq!(policy.kick_cooldown, 600);
    }

    #[test]
    fn test_exclusion_toggles() {
        let mut policy = RaidModePolicy::default();
        policy.set_active(true);
        let chat = ChatId(-100123);

        assert!(policy.applies_to(chat));
        assert!(policy.toggle_exclusion(chat));
        assert!(!policy.applies_to(chat));
        assert!(!policy.toggle_exclusion(chat));
        assert!(policy.applies_to(chat));
    }

    #[test]
    fn test_media_classification_uses_toggles() {
        let mut policy = MediaRestrictPolicy::default();
        assert!(policy.is_media(&[ContentKind::Photo]));
        assert!(!policy.is_media(&[ContentKind::Hashtag]));
        assert!(!policy.is_media(&[]));

        assert!(!policy.toggle_check(ContentKind::Photo));
        assert!(!policy.is_media(&[ContentKind::Photo]));
        assert!(policy.is_media(&[ContentKind::Photo, ContentKind::Url]));
    }

    #[test]
    fn test_partial_policy_file_falls_back_to_defaults() {
        let policy: MediaRestrictPolicy =
            serde_json::from_str(r#"{"restrict_score": 2, "checks": {"photo": false}}"#).unwrap();
        assert_eq!(policy.restrict_score, 2);
        assert_eq!(policy.muting_time, 86400);
        assert!(!policy.counts(ContentKind::Photo));
        assert!(policy.counts(ContentKind::Video));
        assert!(!policy.counts(ContentKind::Mention));
    }

    #[test]
    fn test_tolerance_bounds() {
        let mut policy = NoInfoKickPolicy::default();
        assert_matches!(policy.set_tolerance(0), Err(GroupWardenError::BelowMinimum { .. }));
        assert_matches!(policy.set_tolerance(4), Err(GroupWardenError::AboveMaximum { .. }));
        policy.set_tolerance(3).unwrap();
        assert_eq!(policy.tolerance, 3);
    }

    #[test]
    fn test_defaults_pass_validation() {
        assert!(CaptchaPolicy::default().validate().is_ok());
        assert!(MediaRestrictPolicy::default().validate().is_ok());
        assert!(SlowModePolicy::default().validate().is_ok());
        assert!(RaidModePolicy::default().validate().is_ok());
        assert!(AntiAnonPolicy::default().validate().is_ok());
        assert!(NoInfoKickPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_out_of_range_fields() {
        let media = MediaRestrictPolicy { restrict_score: 0, ..MediaRestrictPolicy::default() };
        assert_matches!(media.validate(), Err(GroupWardenError::BelowMinimum { field: "max score", .. }));

        let slow = SlowModePolicy { max_messages: 1, ..SlowModePolicy::default() };
        assert_matches!(slow.validate(), Err(GroupWardenError::BelowMinimum { minimum: 2, .. }));

        let captcha = CaptchaPolicy { challenge_timeout: 0, ..CaptchaPolicy::default() };
        assert_matches!(captcha.validate(), Err(GroupWardenError::BelowMinimum { minimum: 300, .. }));

        let noinfo = NoInfoKickPolicy { tolerance: 9, ..NoInfoKickPolicy::default() };
        assert_matches!(noinfo.validate(), Err(GroupWardenError::AboveMaximum { maximum: 3, .. }));
    }

    #[test]
    fn test_puzzle_style_parsing() {
        assert_eq!("token".parse::<PuzzleStyle>().unwrap(), PuzzleStyle::Token);
        assert_matches!("image".parse::<PuzzleStyle>(), Err(GroupWardenError::InvalidInput(_)));
    }
}
