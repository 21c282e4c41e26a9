// src/bot/actions.rs - Side effects decided by the games, applied best-effort

use log::{error, info, warn};

use crate::platforms::DiscussionPlatform;
use crate::types::FlairSpec;

/// One side effect to perform on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotAction {
    Remove {
        comment_id: String,
        /// Only used for logging.
        note: String,
    },
    Reply {
        parent_id: String,
        body: String,
        lock: bool,
    },
    SetFlair {
        post_id: String,
        flair: FlairSpec,
    },
    Sticky {
        post_id: String,
        state: bool,
    },
    Distinguish {
        thing_id: String,
        sticky: bool,
    },
    EditBody {
        post_id: String,
        body: String,
    },
    Message {
        username: String,
        subject: String,
        body: String,
    },
}

impl BotAction {
    pub fn remove(comment_id: &str, note: impl Into<String>) -> Self {
        BotAction::Remove {
            comment_id: comment_id.to_string(),
            note: note.into(),
        }
    }

    pub fn reply(parent_id: &str, body: impl Into<String>, lock: bool) -> Self {
        BotAction::Reply {
            parent_id: parent_id.to_string(),
            body: body.into(),
            lock,
        }
    }

    fn describe(&self) -> String {
        match self {
            BotAction::Remove { comment_id, .. } => format!("remove {}", comment_id),
            BotAction::Reply { parent_id, .. } => format!("reply to {}", parent_id),
            BotAction::SetFlair { post_id, flair } => format!("flair {} as {:?}", post_id, flair.text),
            BotAction::Sticky { post_id, state } => format!("sticky {} = {}", post_id, state),
            BotAction::Distinguish { thing_id, .. } => format!("distinguish {}", thing_id),
            BotAction::EditBody { post_id, .. } => format!("edit body of {}", post_id),
            BotAction::Message { username, .. } => format!("message u/{}", username),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionReport {
    pub applied: usize,
    pub failed: usize,
}

/// Apply `actions` in order. A failed action is logged and the rest still
/// run; a transient failure is retried by the next poll.
pub async fn apply_actions(platform: &dyn DiscussionPlatform, actions: &[BotAction]) -> ActionReport {
    let mut report = ActionReport::default();

    for action in actions {
        let result = match action {
            BotAction::Remove { comment_id, note } => {
                info!("Removing {} ({})", comment_id, note);
                platform.remove_comment(comment_id).await
            }
            BotAction::Reply { parent_id, body, lock } => match platform.reply(parent_id, body).await {
                Ok(reply) if *lock => platform.lock_comment(&reply.id).await,
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            },
            BotAction::SetFlair { post_id, flair } => platform.set_flair(post_id, flair).await,
            BotAction::Sticky { post_id, state } => platform.sticky_post(post_id, *state).await,
            BotAction::Distinguish { thing_id, sticky } => platform.distinguish(thing_id, *sticky).await,
            BotAction::EditBody { post_id, body } => platform.edit_post_body(post_id, body).await,
            BotAction::Message { username, subject, body } => {
                platform.message_user(username, subject, body).await
            }
        };

        match result {
            Ok(()) => report.applied += 1,
            Err(e) => {
                report.failed += 1;
                if matches!(action, BotAction::Message { .. }) {
                    warn!("Could not {}: {}", action.describe(), e);
                } else {
                    error!("Failed to {} on {}: {}", action.describe(), platform.platform_name(), e);
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::memory::{InMemoryPlatform, PlatformAction};
    use crate::types::{Comment, Post};
    use chrono::{DateTime, Utc};

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn platform() -> InMemoryPlatform {
        let platform = InMemoryPlatform::new("bot", ts());
        platform.add_post(Post {
            id: "p".to_string(),
            title: "Question?".to_string(),
            author: Some("asker".to_string()),
            body: String::new(),
            flair: None,
            created: ts(),
            stickied: false,
            distinguished: false,
            permalink: String::new(),
            comments: vec![Comment::new("a", Some("u1"), "A", ts())],
        });
        platform
    }

    #[tokio::test]
    async fn test_reply_then_lock() {
        let platform = platform();
        let report = apply_actions(&platform, &[BotAction::reply("a", "Hi u/u1", true)]).await;

        assert_eq!(report, ActionReport { applied: 1, failed: 0 });
        let actions = platform.actions();
        assert!(matches!(actions[0], PlatformAction::Replied { .. }));
        assert!(matches!(actions[1], PlatformAction::Locked(_)));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_rest() {
        let platform = platform();
        platform.fail_messages(true);
        let actions = vec![
            BotAction::remove("missing", "noise"),
            BotAction::Message {
                username: "asker".to_string(),
                subject: "s".to_string(),
                body: "b".to_string(),
            },
            BotAction::remove("a", "noise"),
        ];

        let report = apply_actions(&platform, &actions).await;
        assert_eq!(report, ActionReport { applied: 1, failed: 2 });
        assert_eq!(platform.removals(), vec!["a"]);
    }
}
