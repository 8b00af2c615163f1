//! Per-(user, chat) moderation records
//!
//! A case exists only while a module has an active interest in a member of a
//! chat. Cases are owned by a [`CaseRegistry`](crate::state::CaseRegistry) and
//! only touched through its per-key guard.

use chrono::{DateTime, Utc};
use teloxide::types::{ChatId, MessageId, UserId};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::moderation::puzzle::Puzzle;

/// Identity of a case: one member in one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseKey {
    pub user_id: UserId,
    pub chat_id: ChatId,
}

impl CaseKey {
    pub fn new(user_id: UserId, chat_id: ChatId) -> Self {
        Self { user_id, chat_id }
    }
}

/// A pending captcha challenge
#[derive(Debug, Clone)]
pub struct ChallengeCase {
    /// Distinguishes this challenge from a later one for the same key
    pub id: Uuid,
    pub puzzle: Puzzle,
    pub attempts_left: u32,
    pub regens_left: u32,
    /// Messages deleted on resolution, prompt first
    pub cleanup: Vec<MessageId>,
    pub expires_at: DateTime<Utc>,
    pub timer: Option<AbortHandle>,
}

impl ChallengeCase {
    pub fn new(puzzle: Puzzle, attempts: u32, regens: u32, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            puzzle,
            attempts_left: attempts,
            regens_left: regens,
            cleanup: Vec::new(),
            expires_at,
            timer: None,
        }
    }

    /// Stop the expiry timer, if one is running
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Media-posting score of a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreCase {
    pub score: u32,
    pub media_counter: u32,
    pub message_counter: u32,
    /// Neither a media post nor a full run of plain posts seen yet
    pub first_post_pending: bool,
}

impl Default for ScoreCase {
    fn default() -> Self {
        Self {
            score: 0,
            media_counter: 0,
            message_counter: 0,
            first_post_pending: true,
        }
    }
}

/// Message-burst counter of a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowCase {
    pub counter: u32,
    pub last_event: Instant,
}

impl SlowCase {
    pub fn new(now: Instant) -> Self {
        Self {
            counter: 0,
            last_event: now,
        }
    }
}

/// A joiner already kicked once for an empty profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickRecord {
    pub kicked_at: DateTime<Utc>,
}
