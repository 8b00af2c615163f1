//! Data models module
//!
//! Classified events, per-member cases and admin-editable policies

pub mod case;
pub mod event;
pub mod policy;

// Re-export commonly used models
pub use case::{CaseKey, ChallengeCase, ScoreCase, SlowCase, KickRecord};
pub use event::{ChatEvent, ContentKind, EventKind, Member, SERVICE_ACCOUNT_ID};
pub use policy::{
    Policy, PuzzleStyle, CaptchaPolicy, MediaRestrictPolicy, SlowModePolicy, RaidModePolicy,
    AntiAnonPolicy, NoInfoKickPolicy,
};
