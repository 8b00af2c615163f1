//! Admin command handling
//!
//! Commands have the shape `/<module>[@bot] <sub-command> [value]`. The module
//! named by the command authorizes the sender and applies the change; the
//! command message itself is always removed from the chat.

use std::sync::OnceLock;
use regex::Regex;
use teloxide::types::ChatId;
use teloxide::utils::html;
use tracing::{debug, error};
use crate::models::{ChatEvent, Policy};
use crate::moderation::Module;
use crate::state::PolicyStore;
use crate::utils::errors::{GroupWardenError, Result};
use crate::utils::logging::log_admin_action;

fn command_regex() -> &'static Regex {
    static COMMAND: OnceLock<Regex> = OnceLock::new();
    COMMAND.get_or_init(|| {
        Regex::new(r"^/([^\s@]+)(@\S+)?\s?(.+)?").expect("command pattern is valid")
    })
}

/// Split `/name@bot a b` into the lowercased name and its arguments
pub fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let captures = command_regex().captures(text.trim_start())?;
    let name = captures.get(1)?.as_str().to_lowercase();
    let args = captures
        .get(3)
        .map(|rest| rest.as_str().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    Some((name, args))
}

/// Run an admin command against `module`
pub async fn run_command(module: &dyn Module, event: &ChatEvent, args: &[String]) {
    let chat_id = event.chat_id;
    let admin = event.sender.id;

    match module.authorize(chat_id, admin).await {
        Ok(()) => {
            let reply = match module.execute(chat_id, args).await {
                Ok(reply) => {
                    let action = args.join(" ");
                    log_admin_action(module.name(), admin.0, &action, None);
                    reply
                }
                Err(e) => error_reply(module.title(), &e),
            };
            module.dispatcher().reply(chat_id, &reply).await;
        }
        Err(e) => debug!(module = module.name(), user_id = admin.0, error = %e, "Command ignored"),
    }

    module.dispatcher().delete_message(chat_id, event.message_id).await;
}

/// Text shown to an admin whose command was refused
pub fn error_reply(title: &str, error: &GroupWardenError) -> String {
    match error {
        GroupWardenError::InvalidInput(message) => format!("{} {}.", title, html::escape(message)),
        e if e.is_user_facing() => format!("{} {}.", title, e),
        e => {
            error!(module = title, error = %e, severity = %e.severity(), "Command failed");
            format!("{} settings could not be changed.", title)
        }
    }
}

/// Sub-commands every module understands: `on`, `off`, `settings`, `exclude`.
///
/// Returns `None` when `sub` is not one of them.
pub async fn common_subcommand<P: Policy>(
    store: &PolicyStore<P>,
    title: &str,
    chat_id: ChatId,
    sub: &str,
) -> Option<Result<String>> {
    let result = match sub {
        "on" => store
            .update(|p| {
                p.set_active(true);
                Ok(())
            })
            .await
            .map(|_| format!("{} is now On.", title)),
        "off" => store
            .update(|p| {
                p.set_active(false);
                Ok(())
            })
            .await
            .map(|_| format!("{} is now Off.", title)),
        "settings" => {
            let policy = store.snapshot().await;
            Ok(format!("{} settings:\n<code>{}</code>", title, html::escape(&policy.render())))
        }
        "exclude" => store
            .update(|p| Ok(p.toggle_exclusion(chat_id)))
            .await
            .map(|excluded| {
                if excluded {
                    format!("{} will stop working in this chat.", title)
                } else {
                    format!("{} will resume working in this chat.", title)
                }
            }),
        _ => return None,
    };
    Some(result)
}

/// Usage summary listing each sub-command with its description
pub fn usage(title: &str, command: &str, entries: &[(&str, &str)]) -> String {
    let mut text = format!(
        "{} usage:\n<code>/{} argument [value]</code>\n\n{} arguments:\n",
        title, command, title
    );
    let common = [
        ("on", "Enables the module."),
        ("off", "Disables the module."),
        ("exclude", "Switches the module off or back on for this chat."),
        ("settings", "Shows the current settings."),
    ];
    for (name, description) in common.iter().chain(entries.iter()) {
        text.push_str(&format!("<code>{}</code> - {}\n", name, description));
    }
    text
}

/// Parse a duration in seconds
pub fn parse_seconds(value: Option<&String>, field: &str) -> Result<u64> {
    value
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| GroupWardenError::InvalidInput(format!("{} value is invalid", field)))
}

/// Parse a non-negative count
pub fn parse_count(value: Option<&String>, field: &str) -> Result<u32> {
    value
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| GroupWardenError::InvalidInput(format!("{} value is invalid", field)))
}

/// Parse `true|false|on|off|yes|no`
pub fn parse_bool(value: Option<&String>, field: &str) -> Result<bool> {
    match value.map(|v| v.to_lowercase()).as_deref() {
        Some("true") | Some("on") | Some("yes") => Ok(true),
        Some("false") | Some("off") | Some("no") => Ok(false),
        _ => Err(GroupWardenError::InvalidInput(format!(
            "{} only accepts true or false",
            field
        ))),
    }
}
