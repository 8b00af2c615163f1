//! Authentication middleware
//!
//! Decides whether the sender of an admin command may change a module's
//! policy. Each module keeps its own guard; the administrator list of a chat
//! is fetched on first use and then cached for the lifetime of the process.

use std::collections::HashSet;
use std::sync::Arc;
use dashmap::DashMap;
use teloxide::types::{ChatId, UserId};
use tracing::{debug, warn};
use crate::services::{MemberStatus, Transport};
use crate::utils::errors::{GroupWardenError, Result};
use crate::utils::logging::log_api_error;

/// Per-module administrator check
pub struct AdminGuard {
    module: &'static str,
    transport: Arc<dyn Transport>,
    admins: DashMap<ChatId, HashSet<UserId>>,
}

impl AdminGuard {
    /// Create a new AdminGuard instance
    pub fn new(module: &'static str, transport: Arc<dyn Transport>) -> Self {
        Self {
            module,
            transport,
            admins: DashMap::new(),
        }
    }

    /// Check if user is an admin of the chat, populating the cache on first use.
    ///
    /// A failed lookup is not cached, so the next command retries it.
    pub async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> bool {
        let cached = self.admins.get(&chat_id).map(|admins| admins.contains(&user_id));
        if let Some(is_admin) = cached {
            return is_admin;
        }

        match self.transport.get_administrators(chat_id).await {
            Ok(list) => {
                let admins: HashSet<UserId> = list.into_iter().collect();
                let is_admin = admins.contains(&user_id);
                debug!(module = self.module, chat_id = chat_id.0, count = admins.len(), "Administrator list cached");
                self.admins.insert(chat_id, admins);
                is_admin
            }
            Err(e) => {
                log_api_error(self.module, "get_administrators", &e, Some(&format!("chat {}", chat_id.0)));
                false
            }
        }
    }

    /// Check if user is authorized for admin commands
    pub async fn check_admin_auth(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        if self.is_admin(chat_id, user_id).await {
            debug!(module = self.module, user_id = user_id.0, "Admin authentication successful");
            Ok(())
        } else {
            warn!(module = self.module, user_id = user_id.0, chat_id = chat_id.0, "Unauthorized admin access attempt");
            Err(GroupWardenError::PermissionDenied(
                "Admin privileges required".to_string()
            ))
        }
    }

    /// Check the member's current status directly, bypassing the cache
    pub async fn is_privileged_now(&self, chat_id: ChatId, user_id: UserId) -> bool {
        match self.transport.get_member_status(chat_id, user_id).await {
            Ok(status) => status == MemberStatus::Privileged,
            Err(e) => {
                log_api_error(self.module, "get_member_status", &e, Some(&format!("user {}", user_id.0)));
                false
            }
        }
    }

    /// Number of chats whose administrator list is cached
    pub fn cached_chats(&self) -> usize {
        self.admins.len()
    }
}
