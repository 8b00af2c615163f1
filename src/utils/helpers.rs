//! Helper functions and utilities
//!
//! This module contains common helper functions used throughout the application.

use std::time::Duration;
use teloxide::types::UserId;
use teloxide::utils::html;

/// Mention a user by id with an HTML link, escaping the display name
pub fn mention_html(user_id: UserId, display_name: &str) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user_id.0,
        html::escape(display_name)
    )
}

/// Render a duration the way restriction notices show it ("5 minutes", "1 day")
pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days >= 1 && hours % 24 == 0 {
        pluralize(days, "day")
    } else if hours >= 1 && minutes % 60 == 0 {
        pluralize(hours, "hour")
    } else {
        pluralize(minutes, "minute")
    }
}

/// Format a count together with a singular/plural noun
pub fn pluralize(count: u64, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

/// Generate a random alphanumeric string
pub fn generate_random_string(length: usize) -> String {
    use rand::Rng;
    // Ambiguous glyphs (0/O, 1/l/I) are left out
    const CHARSET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Normalize a submitted answer for comparison
pub fn normalize_answer(text: &str) -> String {
    text.trim().to_lowercase()
}
