use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::types::Comment;

/// Whether the bot already answered a comment.
///
/// Prior bot replies are the only memory carried between polls, so this is
/// what makes a crashed or repeated poll safe to run again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckStatus {
    New,
    /// Handled, and the reply names the player it was counted for.
    Attributed { username: String, acked_at: DateTime<Utc> },
    /// Handled, but the reply names nobody (limit and invalid replies).
    Unattributed { acked_at: DateTime<Utc> },
}

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"u/([A-Za-z0-9_-]+)").expect("static pattern compiles"))
}

pub fn extract_username(text: &str) -> Option<String> {
    username_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Look for a live reply from `bot_name` among the direct replies.
pub fn detect(comment: &Comment, bot_name: &str) -> AckStatus {
    let reply = comment
        .replies
        .iter()
        .find(|r| r.is_authored_by(bot_name) && !r.removed);

    match reply {
        None => AckStatus::New,
        Some(reply) => match extract_username(&reply.body) {
            Some(username) => AckStatus::Attributed { username, acked_at: reply.created },
            None => AckStatus::Unattributed { acked_at: reply.created },
        },
    }
}
