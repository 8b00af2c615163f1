//! Message handlers module
//!
//! Reduces incoming Telegram messages to [`ChatEvent`]s and hands them to the
//! moderation chain.

use std::sync::Arc;
use teloxide::types::{Message, MessageEntityKind, User};
use tracing::debug;
use crate::handlers::commands::parse_command;
use crate::handlers::BotIdentity;
use crate::models::{ChatEvent, ContentKind, EventKind, Member};
use crate::moderation::Moderator;
use crate::utils::errors::Result;

/// Handle incoming group messages
pub async fn handle_message(msg: Message, identity: BotIdentity, moderator: Arc<Moderator>) -> Result<()> {
    let Some(event) = classify(&msg, identity) else {
        debug!(chat_id = msg.chat.id.0, message_id = msg.id.0, "Message not subject to moderation");
        return Ok(());
    };

    debug!(chat_id = event.chat_id.0, user_id = event.sender.id.0, kind = ?event.kind, "Processing event");
    moderator.handle(&event).await;
    Ok(())
}

/// Convert a Telegram user into a moderation member
pub fn member_from_user(user: &User) -> Member {
    Member {
        id: user.id,
        is_bot: user.is_bot,
        display_name: user.full_name(),
        username: user.username.clone(),
    }
}

/// Classify a group message. Private chats, messages without a sender and
/// joins consisting only of the bot itself yield `None`.
pub fn classify(msg: &Message, identity: BotIdentity) -> Option<ChatEvent> {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return None;
    }
    let sender = member_from_user(msg.from.as_ref()?);

    let kind = if let Some(users) = msg.new_chat_members() {
        let members: Vec<Member> = users
            .iter()
            .filter(|user| user.id != identity.0)
            .map(member_from_user)
            .collect();
        if members.is_empty() {
            return None;
        }
        EventKind::Joined(members)
    } else if let Some(user) = msg.left_chat_member() {
        EventKind::Left(member_from_user(user))
    } else if let Some((name, args)) = msg.text().and_then(parse_command) {
        EventKind::Command { name, args }
    } else {
        EventKind::Message {
            text: msg.text().or_else(|| msg.caption()).map(str::to_string),
            contents: detect_contents(msg),
        }
    };

    Some(ChatEvent::new(msg.chat.id, msg.id, sender, kind))
}

/// Every content signal present in `msg`, attachments first, then entities
pub fn detect_contents(msg: &Message) -> Vec<ContentKind> {
    let attachments = [
        (msg.animation().is_some(), ContentKind::Animation),
        (msg.audio().is_some(), ContentKind::Audio),
        (msg.document().is_some(), ContentKind::Document),
        (msg.photo().is_some(), ContentKind::Photo),
        (msg.sticker().is_some(), ContentKind::Sticker),
        (msg.video().is_some(), ContentKind::Video),
        (msg.video_note().is_some(), ContentKind::VideoNote),
        (msg.voice().is_some(), ContentKind::Voice),
        (msg.contact().is_some(), ContentKind::Contact),
        (msg.dice().is_some(), ContentKind::Dice),
        (msg.game().is_some(), ContentKind::Game),
        (msg.poll().is_some(), ContentKind::Poll),
        (msg.venue().is_some(), ContentKind::Venue),
        (msg.location().is_some(), ContentKind::Location),
    ];
    let mut contents: Vec<ContentKind> = attachments
        .into_iter()
        .filter_map(|(present, kind)| present.then_some(kind))
        .collect();

    let entities = msg.entities().or_else(|| msg.caption_entities()).unwrap_or_default();
    for entity in entities {
        let kind = match entity.kind {
            MessageEntityKind::Mention | MessageEntityKind::TextMention { .. } => ContentKind::Mention,
            MessageEntityKind::Hashtag => ContentKind::Hashtag,
            MessageEntityKind::Url | MessageEntityKind::TextLink { .. } => ContentKind::Url,
            MessageEntityKind::Email => ContentKind::Email,
            MessageEntityKind::PhoneNumber => ContentKind::Phone,
            _ => continue,
        };
        if !contents.contains(&kind) {
            contents.push(kind);
        }
    }
    contents
}
