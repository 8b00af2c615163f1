//! Classified chat events
//!
//! Every inbound Telegram message is reduced to a [`ChatEvent`] before any
//! moderation module sees it, so the engines never depend on the raw update
//! layout.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use teloxide::types::{ChatId, MessageId, UserId};

use super::case::CaseKey;

/// User id Telegram uses for posts forwarded from a linked channel
pub const SERVICE_ACCOUNT_ID: UserId = UserId(777000);

/// Kinds of content that may count as a "media" post.
///
/// The last five are textual entity signals rather than attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Animation,
    Audio,
    Document,
    Photo,
    Sticker,
    Video,
    VideoNote,
    Voice,
    Contact,
    Dice,
    Game,
    Poll,
    Venue,
    Location,
    Mention,
    Hashtag,
    Url,
    Email,
    Phone,
}

impl ContentKind {
    pub const ALL: [ContentKind; 19] = [
        ContentKind::Animation,
        ContentKind::Audio,
        ContentKind::Document,
        ContentKind::Photo,
        ContentKind::Sticker,
        ContentKind::Video,
        ContentKind::VideoNote,
        ContentKind::Voice,
        ContentKind::Contact,
        ContentKind::Dice,
        ContentKind::Game,
        ContentKind::Poll,
        ContentKind::Venue,
        ContentKind::Location,
        ContentKind::Mention,
        ContentKind::Hashtag,
        ContentKind::Url,
        ContentKind::Email,
        ContentKind::Phone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Animation => "animation",
            ContentKind::Audio => "audio",
            ContentKind::Document => "document",
            ContentKind::Photo => "photo",
            ContentKind::Sticker => "sticker",
            ContentKind::Video => "video",
            ContentKind::VideoNote => "video_note",
            ContentKind::Voice => "voice",
            ContentKind::Contact => "contact",
            ContentKind::Dice => "dice",
            ContentKind::Game => "game",
            ContentKind::Poll => "poll",
            ContentKind::Venue => "venue",
            ContentKind::Location => "location",
            ContentKind::Mention => "mention",
            ContentKind::Hashtag => "hashtag",
            ContentKind::Url => "url",
            ContentKind::Email => "email",
            ContentKind::Phone => "phone",
        }
    }

    /// Whether this kind counts as media when a policy file does not mention it
    pub fn counted_by_default(&self) -> bool {
        !matches!(self, ContentKind::Mention | ContentKind::Hashtag)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        // Aliases used by the command surface
        let s = match s.as_str() {
            "username" => "mention",
            "videonote" => "video_note",
            "phone_number" => "phone",
            other => other,
        };
        ContentKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown content kind: {}", s))
    }
}

/// The acting user of an event, or a member joining/leaving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub is_bot: bool,
    pub display_name: String,
    pub username: Option<String>,
}

impl Member {
    pub fn new(id: UserId, display_name: &str) -> Self {
        Self {
            id,
            is_bot: false,
            display_name: display_name.to_string(),
            username: None,
        }
    }
}

/// Event category as seen by the moderation modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A regular post: text and/or content; `contents` lists every detected media/entity signal
    Message {
        text: Option<String>,
        contents: Vec<ContentKind>,
    },
    /// `/name args...`, with any `@botname` suffix stripped
    Command { name: String, args: Vec<String> },
    /// Service message announcing new members (the bot itself already filtered out)
    Joined(Vec<Member>),
    /// Service message announcing a member that left or was removed
    Left(Member),
}

/// One inbound event with its acting user and chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Member,
    pub kind: EventKind,
}

impl ChatEvent {
    pub fn new(chat_id: ChatId, message_id: MessageId, sender: Member, kind: EventKind) -> Self {
        Self {
            chat_id,
            message_id,
            sender,
            kind,
        }
    }

    /// Case key of the acting user in this chat
    pub fn key(&self) -> CaseKey {
        CaseKey::new(self.sender.id, self.chat_id)
    }

    /// Message text, if this is a regular post carrying any
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Message { text, .. } => text.as_deref(),
            _ => None,
        }
    }

    /// Detected content signals of a regular post
    pub fn contents(&self) -> &[ContentKind] {
        match &self.kind {
            EventKind::Message { contents, .. } => contents,
            _ => &[],
        }
    }

    /// The same join event minus `removed`.
    ///
    /// `None` when nobody is left; other event kinds are returned unchanged.
    pub fn without_members(&self, removed: &[UserId]) -> Option<ChatEvent> {
        let EventKind::Joined(members) = &self.kind else {
            return Some(self.clone());
        };
        let rest: Vec<Member> = members
            .iter()
            .filter(|member| !removed.contains(&member.id))
            .cloned()
            .collect();
        if rest.is_empty() {
            return None;
        }
        Some(ChatEvent {
            kind: EventKind::Joined(rest),
            ..self.clone()
        })
    }

    pub fn is_message(&self) -> bool {
        matches!(self.kind, EventKind::Message { .. })
    }

    /// Posted by the Telegram service account on behalf of a channel
    pub fn is_from_channel(&self) -> bool {
        self.sender.id == SERVICE_ACCOUNT_ID
    }
}
