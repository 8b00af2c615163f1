//! Test helpers module
//!
//! Builds moderators over a recording transport and a temporary settings
//! directory, plus shorthands for the chat events the classifier produces.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use teloxide::types::{ChatId, MessageId, UserId};

use GroupWarden::config::ModerationConfig;
use GroupWarden::handlers::parse_command;
use GroupWarden::models::{ChatEvent, ContentKind, EventKind, Member};
use GroupWarden::moderation::Moderator;
use GroupWarden::services::{RecordingTransport, Transport};

pub const CHAT: ChatId = ChatId(-1001234567890);
pub const ADMIN: UserId = UserId(1);
pub const TEST_BOT_TOKEN: &str = "12345:test_token";

/// Moderator, transport and settings directory of one test
pub struct TestContext {
    pub moderator: Moderator,
    pub transport: Arc<RecordingTransport>,
    pub dir: TempDir,
}

impl TestContext {
    /// Moderator running `modules`, in order, with default policies
    pub async fn new(modules: &[&str]) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create settings directory");
        let transport = Arc::new(RecordingTransport::new());
        transport.add_admin(CHAT, ADMIN);

        let config = ModerationConfig {
            settings_dir: dir.path().to_path_buf(),
            modules: modules.iter().map(|m| m.to_string()).collect(),
        };
        let shared: Arc<dyn Transport> = transport.clone();
        let moderator = Moderator::from_config(&config, shared).await;

        Self { moderator, transport, dir }
    }

    pub fn settings_path(&self, module: &str) -> PathBuf {
        self.dir.path().join(format!("{}.json", module))
    }

    /// Persisted policy of `module` as raw JSON
    pub fn saved_settings(&self, module: &str) -> serde_json::Value {
        let raw = std::fs::read_to_string(self.settings_path(module)).expect("Settings file missing");
        serde_json::from_str(&raw).expect("Settings file is not valid JSON")
    }

    /// Run `text` as an admin command and return the replies it produced
    pub async fn admin_command(&self, id: i32, text: &str) -> Vec<String> {
        let before = self.transport.sent_texts().await.len();
        self.moderator.handle(&command(ADMIN, id, text)).await;
        self.transport.sent_texts().await.split_off(before)
    }
}

pub fn member(user: u64, name: &str) -> Member {
    Member::new(UserId(user), name)
}

pub fn text(user: u64, id: i32, text: &str) -> ChatEvent {
    ChatEvent::new(
        CHAT,
        MessageId(id),
        member(user, "Member"),
        EventKind::Message { text: Some(text.to_string()), contents: vec![] },
    )
}

pub fn media(user: u64, id: i32, kind: ContentKind) -> ChatEvent {
    ChatEvent::new(
        CHAT,
        MessageId(id),
        member(user, "Member"),
        EventKind::Message { text: None, contents: vec![kind] },
    )
}

pub fn command(user: UserId, id: i32, text: &str) -> ChatEvent {
    let (name, args) = parse_command(text).expect("Not a command");
    ChatEvent::new(CHAT, MessageId(id), Member::new(user, "Admin"), EventKind::Command { name, args })
}

pub fn join(id: i32, members: Vec<Member>) -> ChatEvent {
    let sender = members.first().cloned().unwrap_or_else(|| member(0, "Nobody"));
    ChatEvent::new(CHAT, MessageId(id), sender, EventKind::Joined(members))
}

pub fn left(id: i32, who: Member) -> ChatEvent {
    ChatEvent::new(CHAT, MessageId(id), who.clone(), EventKind::Left(who))
}
