//! Action dispatcher
//!
//! Executes moderation decisions against the [`Transport`]. Every call is
//! fire-and-forget: a failure is logged with the owning module's tag and
//! swallowed, and earlier steps of a compound action are never rolled back.

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use futures::future::join_all;
use teloxide::types::{ChatId, MessageId, UserId};
use crate::utils::logging::{log_api_error, log_moderation_action};
use super::transport::{PermissionSet, Transport};

#[derive(Clone)]
pub struct ActionDispatcher {
    transport: Arc<dyn Transport>,
    module: &'static str,
}

impl ActionDispatcher {
    pub fn new(transport: Arc<dyn Transport>, module: &'static str) -> Self {
        Self { transport, module }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Timed restriction to `permissions`
    pub async fn mute(&self, chat_id: ChatId, user_id: UserId, permissions: PermissionSet, duration: Duration) -> bool {
        let until = Utc::now() + chrono_duration(duration);
        match self.transport.restrict_member(chat_id, user_id, permissions, Some(until)).await {
            Ok(()) => {
                let details = format!("{:?} for {}s", permissions, duration.as_secs());
                log_moderation_action(self.module, chat_id.0, user_id.0, "mute", Some(&details));
                true
            }
            Err(e) => {
                log_api_error(self.module, "restrict_member", &e, Some(&format!("mute user {}", user_id.0)));
                false
            }
        }
    }

    /// Remove a member; they may rejoin after `cooldown`
    pub async fn kick(&self, chat_id: ChatId, user_id: UserId, cooldown: Duration) -> bool {
        let until = Utc::now() + chrono_duration(cooldown);
        match self.transport.kick_member(chat_id, user_id, until).await {
            Ok(()) => {
                let details = format!("cooldown {}s", cooldown.as_secs());
                log_moderation_action(self.module, chat_id.0, user_id.0, "kick", Some(&details));
                true
            }
            Err(e) => {
                log_api_error(self.module, "kick_member", &e, Some(&format!("kick user {}", user_id.0)));
                false
            }
        }
    }

    /// Indefinite restriction to `permissions`
    pub async fn restrict(&self, chat_id: ChatId, user_id: UserId, permissions: PermissionSet) -> bool {
        match self.transport.restrict_member(chat_id, user_id, permissions, None).await {
            Ok(()) => {
                log_moderation_action(self.module, chat_id.0, user_id.0, "restrict", Some(&format!("{:?}", permissions)));
                true
            }
            Err(e) => {
                log_api_error(self.module, "restrict_member", &e, Some(&format!("restrict user {}", user_id.0)));
                false
            }
        }
    }

    /// Give a member back the regular permission set
    pub async fn restore(&self, chat_id: ChatId, user_id: UserId) -> bool {
        self.restrict(chat_id, user_id, PermissionSet::Verified).await
    }

    pub async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        match self.transport.delete_message(chat_id, message_id).await {
            Ok(()) => true,
            Err(e) => {
                log_api_error(self.module, "delete_message", &e, Some(&format!("message {}", message_id.0)));
                false
            }
        }
    }

    /// Delete several messages concurrently; returns how many succeeded
    pub async fn delete_all(&self, chat_id: ChatId, message_ids: &[MessageId]) -> usize {
        let results = join_all(message_ids.iter().map(|id| self.delete_message(chat_id, *id))).await;
        results.into_iter().filter(|deleted| *deleted).count()
    }

    /// Send an HTML reply; the id is returned so callers can schedule cleanup
    pub async fn reply(&self, chat_id: ChatId, html: &str) -> Option<MessageId> {
        match self.transport.send_message(chat_id, html).await {
            Ok(message_id) => Some(message_id),
            Err(e) => {
                log_api_error(self.module, "send_message", &e, Some(&format!("chat {}", chat_id.0)));
                None
            }
        }
    }
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36500))
}
