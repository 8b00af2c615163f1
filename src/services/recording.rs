//! In-memory transport
//!
//! Records every call instead of talking to Telegram. Failures and latency
//! can be injected per method, which makes it suitable for exercising the
//! moderation engines offline.

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use teloxide::types::{ChatId, MessageId, UserId};
use tokio::sync::Mutex;
use crate::utils::errors::{GroupWardenError, Result};
use super::transport::{MemberStatus, PermissionSet, Transport};

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    SendMessage { chat_id: ChatId, text: String, message_id: MessageId },
    DeleteMessage { chat_id: ChatId, message_id: MessageId },
    Restrict { chat_id: ChatId, user_id: UserId, permissions: PermissionSet, until: Option<DateTime<Utc>> },
    Kick { chat_id: ChatId, user_id: UserId, until: DateTime<Utc> },
    GetMemberStatus { chat_id: ChatId, user_id: UserId },
    GetAdministrators { chat_id: ChatId },
    ProfilePhotoCount { user_id: UserId },
    HasBio { user_id: UserId },
}

impl TransportCall {
    fn method(&self) -> &'static str {
        match self {
            TransportCall::SendMessage { .. } => "send_message",
            TransportCall::DeleteMessage { .. } => "delete_message",
            TransportCall::Restrict { .. } => "restrict_member",
            TransportCall::Kick { .. } => "kick_member",
            TransportCall::GetMemberStatus { .. } => "get_member_status",
            TransportCall::GetAdministrators { .. } => "get_administrators",
            TransportCall::ProfilePhotoCount { .. } => "profile_photo_count",
            TransportCall::HasBio { .. } => "has_bio",
        }
    }
}

/// [`Transport`] that records calls in memory
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    next_message_id: AtomicI32,
    admins: DashMap<ChatId, Vec<UserId>>,
    photo_counts: DashMap<UserId, u32>,
    bios: DashSet<UserId>,
    failing: DashSet<&'static str>,
    latency_ms: AtomicU64,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: AtomicI32::new(1000),
            admins: DashMap::new(),
            photo_counts: DashMap::new(),
            bios: DashSet::new(),
            failing: DashSet::new(),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Make `user_id` an administrator of `chat_id`
    pub fn add_admin(&self, chat_id: ChatId, user_id: UserId) {
        self.admins.entry(chat_id).or_default().push(user_id);
    }

    /// Number of profile photos reported for `user_id` (0 when unset)
    pub fn set_photo_count(&self, user_id: UserId, count: u32) {
        self.photo_counts.insert(user_id, count);
    }

    /// Give `user_id` a profile bio (none when unset)
    pub fn set_bio(&self, user_id: UserId) {
        self.bios.insert(user_id);
    }

    /// Make every call of `method` fail, e.g. `"delete_message"`
    pub fn fail_method(&self, method: &'static str) {
        self.failing.insert(method);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// All calls so far, in order
    pub async fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.calls.lock().await.clear();
    }

    /// Texts of all sent messages
    pub async fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::SendMessage { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Users kicked, in order
    pub async fn kicks(&self) -> Vec<(ChatId, UserId, DateTime<Utc>)> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Kick { chat_id, user_id, until } => Some((chat_id, user_id, until)),
                _ => None,
            })
            .collect()
    }

    /// Restrictions applied, in order
    pub async fn restrictions(&self) -> Vec<(UserId, PermissionSet, Option<DateTime<Utc>>)> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Restrict { user_id, permissions, until, .. } => Some((user_id, permissions, until)),
                _ => None,
            })
            .collect()
    }

    /// Message ids deleted, in order
    pub async fn deleted(&self) -> Vec<MessageId> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::DeleteMessage { message_id, .. } => Some(message_id),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: TransportCall) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let method = call.method();
        self.calls.lock().await.push(call);

        if self.failing.contains(method) {
            return Err(GroupWardenError::Transport(format!("{} failed", method)));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(&self, chat_id: ChatId, html: &str) -> Result<MessageId> {
        let message_id = MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        self.record(TransportCall::SendMessage {
            chat_id,
            text: html.to_string(),
            message_id,
        })
        .await?;
        Ok(message_id)
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.record(TransportCall::DeleteMessage { chat_id, message_id }).await
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.record(TransportCall::Restrict { chat_id, user_id, permissions, until }).await
    }

    async fn kick_member(&self, chat_id: ChatId, user_id: UserId, until: DateTime<Utc>) -> Result<()> {
        self.record(TransportCall::Kick { chat_id, user_id, until }).await
    }

    async fn get_member_status(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberStatus> {
        self.record(TransportCall::GetMemberStatus { chat_id, user_id }).await?;
        let privileged = self
            .admins
            .get(&chat_id)
            .map(|admins| admins.contains(&user_id))
            .unwrap_or(false);
        Ok(if privileged { MemberStatus::Privileged } else { MemberStatus::Regular })
    }

    async fn get_administrators(&self, chat_id: ChatId) -> Result<Vec<UserId>> {
        self.record(TransportCall::GetAdministrators { chat_id }).await?;
        Ok(self.admins.get(&chat_id).map(|admins| admins.value().clone()).unwrap_or_default())
    }

    async fn profile_photo_count(&self, user_id: UserId) -> Result<u32> {
        self.record(TransportCall::ProfilePhotoCount { user_id }).await?;
        Ok(self.photo_counts.get(&user_id).map(|count| *count).unwrap_or(0))
    }

    async fn has_bio(&self, user_id: UserId) -> Result<bool> {
        self.record(TransportCall::HasBio { user_id }).await?;
        Ok(self.bios.contains(&user_id))
    }
}
