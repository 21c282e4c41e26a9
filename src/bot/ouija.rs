// src/bot/ouija.rs - Tree spelling game: answers are built one letter per
// reply and closed by a stop word

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::bot::ack::{self, AckStatus};
use crate::bot::actions::{apply_actions, BotAction};
use crate::bot::answer_builder::{answered_flair_text, passes_score_floor, AnswerBuilder, TreeWalk};
use crate::bot::moderation::{ModerationRules, RemovalReason};
use crate::bot::submission_gate::{set_gate, Gate};
use crate::config::OuijaConfig;
use crate::platforms::DiscussionPlatform;
use crate::types::{Comment, CommentSort, Post};

/// Counters for one `ouija check` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OuijaReport {
    pub posts_walked: usize,
    pub answered: usize,
    pub removals: usize,
    pub failed_actions: usize,
}

/// Announcement body listing the questions still waiting for an answer.
pub fn closing_body(intro: &str, header: &str, open: &[&Post]) -> String {
    let mut body = intro.to_string();
    if !open.is_empty() {
        let items: Vec<String> = open
            .iter()
            .map(|post| format!("* [{}]({})", post.title, post.permalink))
            .collect();
        body.push_str(&format!("\n\n{}\n\n{}", header, items.join("\n")));
    }
    body
}

pub struct OuijaGame {
    platform: Arc<dyn DiscussionPlatform>,
    config: OuijaConfig,
    rules: ModerationRules,
    bot_name: String,
}

impl OuijaGame {
    pub fn new(platform: Arc<dyn DiscussionPlatform>, config: OuijaConfig, bot_name: String) -> Result<Self> {
        let rules = ModerationRules::new(&config.stop_words)?;
        Ok(Self {
            platform,
            config,
            rules,
            bot_name,
        })
    }

    fn is_unanswered(&self, post: &Post) -> bool {
        post.flair_text().is_none() || post.flair_css_class() == Some(self.config.unanswered_flair.css_class.as_str())
    }

    fn is_question(&self, post: &Post) -> bool {
        !post.distinguished && !post.stickied && post.author.as_deref() != Some(self.bot_name.as_str())
    }

    /// Walk every unanswered post among the newest ones.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<OuijaReport> {
        let mut report = OuijaReport::default();
        let posts = self.platform.fetch_new_posts(self.config.new_posts_limit).await?;

        for post in posts {
            if post.distinguished || post.stickied {
                if post.flair_text().is_none() {
                    let action = BotAction::SetFlair {
                        post_id: post.id.clone(),
                        flair: self.config.mod_post_flair.clone(),
                    };
                    report.failed_actions += apply_actions(self.platform.as_ref(), &[action]).await.failed;
                }
                continue;
            }
            if post.author.as_deref() == Some(self.bot_name.as_str()) || !self.is_unanswered(&post) {
                continue;
            }

            let tree = match self.platform.fetch_comment_tree(&post.id, CommentSort::Top).await {
                Ok(tree) => tree,
                Err(e) => {
                    error!("Cannot fetch comments of {}: {}", post.id, e);
                    continue;
                }
            };

            let walk = AnswerBuilder::new(&self.rules).walk(&tree);
            let actions = self.plan(&tree, &walk, now);
            report.posts_walked += 1;
            report.removals += walk.removals.len();
            if actions.iter().any(|a| matches!(a, BotAction::SetFlair { flair, .. } if flair.css_class == self.config.answered_flair.css_class)) {
                report.answered += 1;
            }
            report.failed_actions += apply_actions(self.platform.as_ref(), &actions).await.failed;
        }

        info!(
            "Walked {} posts: {} answered, {} removals",
            report.posts_walked, report.answered, report.removals
        );
        Ok(report)
    }

    /// Stop new questions and post the closing announcement, with the
    /// questions still open and a sticky comment players can reply to in
    /// order to hear about the next opening.
    pub async fn close(&self, now: DateTime<Utc>) -> Result<Post> {
        self.set_gate(Gate::Closed).await?;
        let schedule = &self.config.schedule;

        let posts = self.platform.fetch_new_posts(self.config.new_posts_limit).await?;
        let open: Vec<&Post> = posts
            .iter()
            .filter(|post| self.is_question(post) && self.is_unanswered(post))
            .collect();
        let reopening = now + Duration::hours(schedule.reopen_after_hours);
        let title = format!("{}{}", schedule.closing_title_prefix, reopening.format(&schedule.date_format));
        let body = closing_body(&schedule.closing_body, &schedule.open_questions_header, &open);

        let post = self.platform.submit_post(&title, &body).await?;
        info!("Closed with {} open questions - {}", open.len(), post.permalink);

        let mut actions = vec![
            BotAction::Sticky {
                post_id: post.id.clone(),
                state: true,
            },
            BotAction::Distinguish {
                thing_id: post.id.clone(),
                sticky: false,
            },
        ];
        match self.platform.reply(&post.id, &schedule.subscription_comment).await {
            Ok(comment) => actions.push(BotAction::Distinguish {
                thing_id: comment.id,
                sticky: true,
            }),
            Err(e) => error!("Cannot add the subscription comment to {}: {}", post.id, e),
        }
        apply_actions(self.platform.as_ref(), &actions).await;
        Ok(post)
    }

    /// Accept new questions again, unpin the closing announcement and tell
    /// everyone who replied to its sticky comment. Returns how many were
    /// notified.
    pub async fn open(&self) -> Result<usize> {
        self.set_gate(Gate::Open).await?;
        info!("Accepting new questions");

        let posts = self.platform.fetch_new_posts(self.config.new_posts_limit).await?;
        let closing = posts
            .into_iter()
            .find(|post| post.distinguished && post.author.as_deref() == Some(self.bot_name.as_str()));
        let Some(closing) = closing else {
            warn!("No closing announcement found, nobody to notify");
            return Ok(0);
        };

        let tree = self.platform.fetch_comment_tree(&closing.id, CommentSort::New).await?;
        let subscribers: &[Comment] = match tree.comments.iter().find(|c| c.distinguished) {
            Some(subscription) => &subscription.replies,
            None => &tree.comments,
        };

        let mut actions = vec![BotAction::Sticky {
            post_id: closing.id.clone(),
            state: false,
        }];
        let mut notified = 0;
        for comment in subscribers {
            if comment.removed || comment.author.is_none() || comment.is_authored_by(&self.bot_name) {
                continue;
            }
            if ack::detect(comment, &self.bot_name) != AckStatus::New {
                continue;
            }
            actions.push(BotAction::reply(&comment.id, self.config.schedule.opening_reply.as_str(), false));
            notified += 1;
        }

        let report = apply_actions(self.platform.as_ref(), &actions).await;
        info!("Notified {} players under {}, {} actions failed", notified, closing.id, report.failed);
        Ok(notified)
    }

    async fn set_gate(&self, gate: Gate) -> Result<()> {
        let schedule = &self.config.schedule;
        let rules = self.platform.read_document(&schedule.automod_page).await?;

        match set_gate(&rules.content, &schedule.automod_marker, gate) {
            Some(updated) if updated == rules.content => debug!("Automoderator already {:?}", gate),
            Some(updated) => {
                self.platform
                    .edit_document(&schedule.automod_page, &updated, gate.reason())
                    .await?
            }
            None => {
                error!("No automoderator rule marked {:?}", schedule.automod_marker);
                let subject = format!("{} failed", gate.reason());
                if let Err(e) = self
                    .platform
                    .message_moderators(&subject, "The automoderator rule for new questions was not found.")
                    .await
                {
                    warn!("Could not alert the moderators: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Turn the result of a walk into platform actions.
    pub fn plan(&self, post: &Post, walk: &TreeWalk, now: DateTime<Utc>) -> Vec<BotAction> {
        let mut actions = Vec::new();

        for removal in &walk.removals {
            let explanation = match removal.reason {
                RemovalReason::AskerAnswering => Some(&self.config.removal_messages.asker_answering),
                RemovalReason::SelfChain => Some(&self.config.removal_messages.self_chain),
                _ => None,
            };
            if let Some(explanation) = explanation {
                // A removal that failed last time was already explained.
                let explained = post
                    .find_comment(&removal.comment_id)
                    .is_some_and(|c| ack::detect(c, &self.bot_name) != AckStatus::New);
                if explained {
                    debug!("{} already has an explanation", removal.comment_id);
                } else {
                    actions.push(BotAction::reply(&removal.comment_id, explanation.as_str(), false));
                }
            }
            actions.push(BotAction::remove(&removal.comment_id, removal.reason.to_string()));
            for id in &removal.thread {
                if post.find_comment(id).is_some_and(|c| c.is_authored_by(&self.bot_name)) {
                    continue;
                }
                actions.push(BotAction::remove(id, format!("thread of {}", removal.comment_id)));
            }
        }

        let age_hours = post.age_hours(now);
        let answer = walk.answer.as_ref().filter(|answer| {
            let passes = passes_score_floor(&self.config.score_floor, answer.score, age_hours);
            if !passes {
                debug!(
                    "Post {} answer {:?} score {} under the floor at {:.1}h",
                    post.id, answer.text, answer.score, age_hours
                );
            }
            passes
        });

        match answer {
            None => {
                if post.flair_text().is_none() {
                    actions.push(BotAction::SetFlair {
                        post_id: post.id.clone(),
                        flair: self.config.unanswered_flair.clone(),
                    });
                }
            }
            Some(answer) => {
                let text = answered_flair_text(
                    &self.config.answered_flair.text,
                    &answer.text,
                    self.config.flair_max_length,
                );
                let current = post.flair_text().filter(|t| *t != self.config.unanswered_flair.text);
                if current != Some(text.as_str()) {
                    info!("Flair - {} - {}", text, post.permalink);
                    actions.push(BotAction::SetFlair {
                        post_id: post.id.clone(),
                        flair: self.config.answered_flair.with_text(text),
                    });
                    if let Some(asker) = post.author.as_deref() {
                        let notification = &self.config.notification;
                        let body = notification
                            .body
                            .replace("$(question)", &post.title)
                            .replace("$(answer)", &answer.text)
                            .replace("$(permalink)", &answer.permalink);
                        actions.push(BotAction::Message {
                            username: asker.to_string(),
                            subject: notification.subject.clone(),
                            body,
                        });
                    }
                }
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::memory::InMemoryPlatform;
    use crate::types::{Comment, PostFlair};
    use chrono::Duration;

    fn ts(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap().with_timezone(&Utc) + Duration::minutes(minutes)
    }

    fn game() -> OuijaGame {
        let platform = Arc::new(InMemoryPlatform::new("bot", ts(0)));
        OuijaGame::new(platform, OuijaConfig::default(), "bot".to_string()).unwrap()
    }

    fn post(comments: Vec<Comment>) -> Post {
        Post {
            id: "p".to_string(),
            title: "Who are you?".to_string(),
            author: Some("asker".to_string()),
            body: String::new(),
            flair: None,
            created: ts(0),
            stickied: false,
            distinguished: false,
            permalink: "/r/test/comments/p".to_string(),
            comments,
        }
    }

    fn chain(stop_score: i64) -> Vec<Comment> {
        let mut stop = Comment::new("c", Some("u3"), "Goodbye", ts(3)).with_score(stop_score);
        stop.permalink = "/r/test/comments/p/_/c".to_string();
        vec![Comment::new("a", Some("u1"), "a", ts(1))
            .with_reply(Comment::new("b", Some("u2"), "b", ts(2)).with_reply(stop))]
    }

    #[test]
    fn test_answer_sets_flair_and_notifies() {
        let game = game();
        let post = post(chain(7));
        let walk = AnswerBuilder::new(&game.rules).walk(&post);
        let actions = game.plan(&post, &walk, ts(60));

        assert_eq!(actions.len(), 2);
        match &actions[0] {
            BotAction::SetFlair { flair, .. } => {
                assert_eq!(flair.text, "Ouija says: AB");
                assert_eq!(flair.css_class, "answered");
            }
            other => panic!("expected flair, got {:?}", other),
        }
        match &actions[1] {
            BotAction::Message { username, body, .. } => {
                assert_eq!(username, "asker");
                assert!(body.contains("Who are you?"));
                assert!(body.contains("> AB"));
                assert!(body.contains("/r/test/comments/p/_/c?context=100"));
            }
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[test]
    fn test_low_score_on_young_post_is_rejected() {
        let game = game();
        let post = post(chain(2));
        let walk = AnswerBuilder::new(&game.rules).walk(&post);
        assert!(walk.answer.is_some());

        let actions = game.plan(&post, &walk, ts(60));
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            BotAction::SetFlair { flair, .. } => assert_eq!(flair.text, "Unanswered"),
            other => panic!("expected unanswered flair, got {:?}", other),
        }
    }

    #[test]
    fn test_same_answer_is_not_flaired_twice() {
        let game = game();
        let mut post = post(chain(7));
        post.flair = Some(PostFlair {
            text: "Ouija says: AB".to_string(),
            css_class: Some("unanswered".to_string()),
        });
        let walk = AnswerBuilder::new(&game.rules).walk(&post);
        assert!(game.plan(&post, &walk, ts(60)).is_empty());
    }

    #[test]
    fn test_thread_removal_is_explained() {
        let game = game();
        let by_asker = Comment::new("x", Some("asker"), "z", ts(1))
            .with_reply(Comment::new("y", Some("u1"), "q", ts(2)));
        let post = post(vec![by_asker, Comment::new("n", Some("u2"), "noise", ts(1))]);
        let walk = AnswerBuilder::new(&game.rules).walk(&post);
        let actions = game.plan(&post, &walk, ts(60));

        assert!(matches!(&actions[0], BotAction::Reply { parent_id, lock: false, .. } if parent_id == "x"));
        assert!(matches!(&actions[1], BotAction::Remove { comment_id, .. } if comment_id == "x"));
        assert!(matches!(&actions[2], BotAction::Remove { comment_id, .. } if comment_id == "y"));
        assert!(matches!(&actions[3], BotAction::Remove { comment_id, .. } if comment_id == "n"));
        assert!(matches!(&actions[4], BotAction::SetFlair { .. }));
    }

    #[test]
    fn test_closing_body_lists_open_questions() {
        let mut first = post(Vec::new());
        first.title = "Who are you?".to_string();
        first.permalink = "https://example.com/p1".to_string();

        assert_eq!(closing_body("See you.", "Still open:", &[]), "See you.");
        assert_eq!(
            closing_body("See you.", "Still open:", &[&first]),
            "See you.\n\nStill open:\n\n* [Who are you?](https://example.com/p1)"
        );
    }

    #[test]
    fn test_thread_removal_is_explained_once() {
        let game = game();
        let by_asker = Comment::new("x", Some("asker"), "z", ts(1))
            .with_reply(Comment::new("r", Some("bot"), "The author of the question cannot write the answer.", ts(5)))
            .with_reply(Comment::new("y", Some("u1"), "q", ts(2)));
        let post = post(vec![by_asker]);
        let walk = AnswerBuilder::new(&game.rules).walk(&post);
        let actions = game.plan(&post, &walk, ts(60));

        assert!(!actions.iter().any(|a| matches!(a, BotAction::Reply { .. })));
        let removed: Vec<&str> = actions
            .iter()
            .filter_map(|a| match a {
                BotAction::Remove { comment_id, .. } => Some(comment_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec!["x", "y"]);
    }
}
