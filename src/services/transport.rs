//! Chat platform boundary
//!
//! The moderation engines talk to Telegram only through the [`Transport`]
//! trait. [`TelegramTransport`] implements it over a teloxide [`Bot`];
//! [`RecordingTransport`](super::recording::RecordingTransport) implements it
//! in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{
    Bot,
    payloads::{BanChatMemberSetters, RestrictChatMemberSetters, SendMessageSetters},
    prelude::Request,
    requests::Requester,
    types::{ChatId, ChatMemberKind, ChatPermissions, MessageId, ParseMode, UserId},
};
use tracing::debug;
use crate::utils::errors::Result;

/// Permission bundles the moderation modules grant or revoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionSet {
    /// Challenged newcomer: plain text only
    Unverified,
    /// Everything a regular member may post
    Verified,
    /// Media-restricted member: plain text only
    TextOnly,
    /// Nothing at all
    Muted,
}

impl PermissionSet {
    pub fn to_chat_permissions(self) -> ChatPermissions {
        match self {
            PermissionSet::Unverified | PermissionSet::TextOnly => ChatPermissions::SEND_MESSAGES,
            PermissionSet::Verified => {
                ChatPermissions::SEND_MESSAGES
                    | ChatPermissions::SEND_MEDIA_MESSAGES
                    | ChatPermissions::SEND_POLLS
                    | ChatPermissions::SEND_OTHER_MESSAGES
                    | ChatPermissions::ADD_WEB_PAGE_PREVIEWS
            }
            PermissionSet::Muted => ChatPermissions::empty(),
        }
    }
}

/// Coarse membership status; only the admin distinction matters here
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    /// Owner or administrator
    Privileged,
    Regular,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an HTML-formatted message, returning its id
    async fn send_message(&self, chat_id: ChatId, html: &str) -> Result<MessageId>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()>;

    /// Apply `permissions` until `until`, or indefinitely when `None`
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Remove a member, barring them from rejoining before `until`
    async fn kick_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()>;

    async fn get_member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus>;

    async fn get_administrators(&self, chat_id: ChatId) -> Result<Vec<UserId>>;

    async fn profile_photo_count(&self, user_id: UserId) -> Result<u32>;

    /// Whether the user's profile carries a bio
    async fn has_bio(&self, user_id: UserId) -> Result<bool>;
}

/// [`Transport`] over the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(&self, chat_id: ChatId, html: &str) -> Result<MessageId> {
        let message = self
            .bot
            .send_message(chat_id, html)
            .parse_mode(ParseMode::Html)
            .send()
            .await?;
        debug!(chat_id = chat_id.0, message_id = message.id.0, "Message sent");
        Ok(message.id)
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.bot.delete_message(chat_id, message_id).send().await?;
        Ok(())
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let request = self
            .bot
            .restrict_chat_member(chat_id, user_id, permissions.to_chat_permissions());
        match until {
            Some(until) => request.until_date(until).send().await?,
            None => request.send().await?,
        };
        Ok(())
    }

    async fn kick_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()> {
        self.bot
            .ban_chat_member(chat_id, user_id)
            .until_date(until)
            .send()
            .await?;
        Ok(())
    }

    async fn get_member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
        let member = self.bot.get_chat_member(chat_id, user_id).send().await?;
        Ok(match member.kind {
            ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_) => MemberStatus::Privileged,
            _ => MemberStatus::Regular,
        })
    }

    async fn get_administrators(&self, chat_id: ChatId) -> Result<Vec<UserId>> {
        let admins = self.bot.get_chat_administrators(chat_id).send().await?;
        Ok(admins.into_iter().map(|member| member.user.id).collect())
    }

    async fn profile_photo_count(&self, user_id: UserId) -> Result<u32> {
        let photos = self.bot.get_user_profile_photos(user_id).send().await?;
        Ok(photos.total_count)
    }

    async fn has_bio(&self, user_id: UserId) -> Result<bool> {
        let chat = self.bot.get_chat(ChatId::from(user_id)).send().await?;
        Ok(chat.bio().is_some_and(|bio| !bio.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_sets() {
        assert_eq!(PermissionSet::Muted.to_chat_permissions(), ChatPermissions::empty());
        assert_eq!(
            PermissionSet::Unverified.to_chat_permissions(),
            PermissionSet::TextOnly.to_chat_permissions()
        );

        let verified = PermissionSet::Verified.to_chat_permissions();
        assert!(verified.contains(ChatPermissions::SEND_MESSAGES));
        assert!(verified.contains(ChatPermissions::SEND_MEDIA_MESSAGES));
        assert!(!verified.contains(ChatPermissions::PIN_MESSAGES));
    }
}
