use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::platforms::DiscussionPlatform;
use crate::types::{Comment, CommentSort, FlairSpec, Post, PostFlair, WikiDocument};

/// Side effect recorded by [`InMemoryPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformAction {
    Removed(String),
    Replied { parent_id: String, comment_id: String, body: String },
    Locked(String),
    Flaired { post_id: String, flair: FlairSpec },
    Stickied { post_id: String, state: bool },
    Edited { post_id: String, body: String },
    Messaged { username: String, subject: String, body: String },
    ModeratorsMessaged { subject: String },
    Distinguished { thing_id: String, sticky: bool },
    DocumentEdited { page: String, reason: String },
    Submitted { post_id: String, title: String },
}

#[derive(Debug)]
struct State {
    now: DateTime<Utc>,
    next_id: u64,
    posts: Vec<Post>,
    documents: HashMap<String, WikiDocument>,
    actions: Vec<PlatformAction>,
    fail_messages: bool,
}

/// Platform kept entirely in memory.
///
/// Mutations are applied to the stored posts, so a later fetch sees what an
/// earlier poll did. Bot comments are stamped with the platform clock, which
/// tests move with [`InMemoryPlatform::advance`].
#[derive(Debug)]
pub struct InMemoryPlatform {
    user: String,
    state: Mutex<State>,
}

impl InMemoryPlatform {
    pub fn new(user: &str, now: DateTime<Utc>) -> Self {
        Self {
            user: user.to_string(),
            state: Mutex::new(State {
                now,
                next_id: 1,
                posts: Vec::new(),
                documents: HashMap::new(),
                actions: Vec::new(),
                fail_messages: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.state().now = now;
    }

    pub fn advance(&self, by: Duration) {
        self.state().now += by;
    }

    pub fn add_post(&self, post: Post) {
        self.state().posts.push(post);
    }

    /// Attach `comment` under `parent_id`, a post or a comment id.
    pub fn add_comment(&self, parent_id: &str, comment: Comment) -> Result<()> {
        let mut state = self.state();
        attach(&mut state.posts, parent_id, comment)
    }

    pub fn set_document(&self, page: &str, content: &str, revised: DateTime<Utc>) {
        self.state().documents.insert(
            page.to_string(),
            WikiDocument {
                content: content.to_string(),
                revised,
            },
        );
    }

    /// Make every private message fail, like a user who blocked the bot.
    pub fn fail_messages(&self, fail: bool) {
        self.state().fail_messages = fail;
    }

    pub fn document(&self, page: &str) -> Option<String> {
        self.state().documents.get(page).map(|d| d.content.clone())
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.state().posts.iter().find(|p| p.id == post_id).cloned()
    }

    pub fn comment(&self, comment_id: &str) -> Option<Comment> {
        let mut state = self.state();
        state
            .posts
            .iter_mut()
            .find_map(|p| find_comment(&mut p.comments, comment_id))
            .map(|c| c.clone())
    }

    pub fn actions(&self) -> Vec<PlatformAction> {
        self.state().actions.clone()
    }

    pub fn clear_actions(&self) {
        self.state().actions.clear();
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PlatformAction::Replied { parent_id, body, .. } => Some((parent_id, body)),
                _ => None,
            })
            .collect()
    }

    pub fn removals(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PlatformAction::Removed(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                PlatformAction::Edited { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    fn with_comment<T>(&self, comment_id: &str, f: impl FnOnce(&mut Comment) -> T) -> Result<T> {
        let mut state = self.state();
        let comment = state
            .posts
            .iter_mut()
            .find_map(|p| find_comment(&mut p.comments, comment_id))
            .ok_or_else(|| anyhow!("Comment {} not found", comment_id))?;
        Ok(f(comment))
    }

    fn with_post<T>(&self, post_id: &str, f: impl FnOnce(&mut Post) -> T) -> Result<T> {
        let mut state = self.state();
        let post = state
            .posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or_else(|| anyhow!("Post {} not found", post_id))?;
        Ok(f(post))
    }

    fn record(&self, action: PlatformAction) {
        debug!("memory platform: {:?}", action);
        self.state().actions.push(action);
    }
}

fn find_comment<'a>(comments: &'a mut [Comment], id: &str) -> Option<&'a mut Comment> {
    for comment in comments.iter_mut() {
        if comment.id == id {
            return Some(comment);
        }
        if let Some(found) = find_comment(&mut comment.replies, id) {
            return Some(found);
        }
    }
    None
}

fn attach(posts: &mut [Post], parent_id: &str, comment: Comment) -> Result<()> {
    if let Some(post) = posts.iter_mut().find(|p| p.id == parent_id) {
        post.comments.push(comment);
        return Ok(());
    }
    let parent = posts
        .iter_mut()
        .find_map(|p| find_comment(&mut p.comments, parent_id))
        .ok_or_else(|| anyhow!("Parent {} not found", parent_id))?;
    parent.replies.push(comment);
    Ok(())
}

fn sort_comments(comments: &mut [Comment], sort: CommentSort) {
    match sort {
        CommentSort::Top => comments.sort_by(|a, b| b.score.cmp(&a.score)),
        CommentSort::New => comments.sort_by(|a, b| b.created.cmp(&a.created)),
    }
    for comment in comments.iter_mut() {
        sort_comments(&mut comment.replies, sort);
    }
}

#[async_trait]
impl DiscussionPlatform for InMemoryPlatform {
    fn platform_name(&self) -> &str {
        "memory"
    }

    async fn current_user(&self) -> Result<String> {
        Ok(self.user.clone())
    }

    async fn fetch_new_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .state()
            .posts
            .iter()
            .map(|p| Post {
                comments: Vec::new(),
                ..p.clone()
            })
            .collect();
        posts.sort_by(|a, b| b.created.cmp(&a.created));
        posts.truncate(limit);
        Ok(posts)
    }

    async fn fetch_comment_tree(&self, post_id: &str, sort: CommentSort) -> Result<Post> {
        let mut post = self.with_post(post_id, |p| p.clone())?;
        sort_comments(&mut post.comments, sort);
        Ok(post)
    }

    async fn fetch_top_level_comments(&self, post_id: &str, sort: CommentSort) -> Result<Vec<Comment>> {
        Ok(self.fetch_comment_tree(post_id, sort).await?.comments)
    }

    async fn remove_comment(&self, comment_id: &str) -> Result<()> {
        self.with_comment(comment_id, |c| c.removed = true)?;
        self.record(PlatformAction::Removed(comment_id.to_string()));
        Ok(())
    }

    async fn reply(&self, parent_id: &str, body: &str) -> Result<Comment> {
        let comment = {
            let mut state = self.state();
            let id = format!("t1_bot{}", state.next_id);
            state.next_id += 1;
            let mut comment = Comment::new(&id, Some(self.user.as_str()), body, state.now);
            comment.permalink = format!("/memory/{}", id);
            attach(&mut state.posts, parent_id, comment.clone())?;
            comment
        };
        self.record(PlatformAction::Replied {
            parent_id: parent_id.to_string(),
            comment_id: comment.id.clone(),
            body: body.to_string(),
        });
        Ok(comment)
    }

    async fn lock_comment(&self, comment_id: &str) -> Result<()> {
        self.with_comment(comment_id, |c| c.locked = true)?;
        self.record(PlatformAction::Locked(comment_id.to_string()));
        Ok(())
    }

    async fn set_flair(&self, post_id: &str, flair: &FlairSpec) -> Result<()> {
        self.with_post(post_id, |p| {
            p.flair = Some(PostFlair {
                text: flair.text.clone(),
                css_class: Some(flair.css_class.clone()).filter(|c| !c.is_empty()),
            })
        })?;
        self.record(PlatformAction::Flaired {
            post_id: post_id.to_string(),
            flair: flair.clone(),
        });
        Ok(())
    }

    async fn sticky_post(&self, post_id: &str, state: bool) -> Result<()> {
        self.with_post(post_id, |p| p.stickied = state)?;
        self.record(PlatformAction::Stickied {
            post_id: post_id.to_string(),
            state,
        });
        Ok(())
    }

    async fn edit_post_body(&self, post_id: &str, body: &str) -> Result<()> {
        self.with_post(post_id, |p| p.body = body.to_string())?;
        self.record(PlatformAction::Edited {
            post_id: post_id.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn message_user(&self, username: &str, subject: &str, body: &str) -> Result<()> {
        if self.state().fail_messages {
            return Err(anyhow!("{} does not accept private messages", username));
        }
        self.record(PlatformAction::Messaged {
            username: username.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn message_moderators(&self, subject: &str, _body: &str) -> Result<()> {
        self.record(PlatformAction::ModeratorsMessaged {
            subject: subject.to_string(),
        });
        Ok(())
    }

    async fn distinguish(&self, thing_id: &str, sticky: bool) -> Result<()> {
        let on_post = self.with_post(thing_id, |p| p.distinguished = true).is_ok();
        if !on_post {
            self.with_comment(thing_id, |c| {
                c.distinguished = true;
                c.stickied = sticky;
            })?;
        }
        self.record(PlatformAction::Distinguished {
            thing_id: thing_id.to_string(),
            sticky,
        });
        Ok(())
    }

    async fn read_document(&self, page: &str) -> Result<WikiDocument> {
        self.state()
            .documents
            .get(page)
            .cloned()
            .ok_or_else(|| anyhow!("Wiki page {} not found", page))
    }

    async fn edit_document(&self, page: &str, content: &str, reason: &str) -> Result<()> {
        {
            let mut state = self.state();
            let revised = state.now;
            state.documents.insert(
                page.to_string(),
                WikiDocument {
                    content: content.to_string(),
                    revised,
                },
            );
        }
        self.record(PlatformAction::DocumentEdited {
            page: page.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn submit_post(&self, title: &str, body: &str) -> Result<Post> {
        let post = {
            let mut state = self.state();
            let id = format!("post{}", state.next_id);
            state.next_id += 1;
            let post = Post {
                id: id.clone(),
                title: title.to_string(),
                author: Some(self.user.clone()),
                body: body.to_string(),
                flair: None,
                created: state.now,
                stickied: false,
                distinguished: false,
                permalink: format!("/memory/{}", id),
                comments: Vec::new(),
            };
            state.posts.push(post.clone());
            post
        };
        self.record(PlatformAction::Submitted {
            post_id: post.id.clone(),
            title: title.to_string(),
        });
        Ok(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            comments: Vec::new(),
        });
        platform
    }

    #[tokio::test]
    async fn test_reply_is_visible_on_next_fetch() {
        let platform = platform();
        platform.add_comment("p", Comment::new("a", Some("u1"), "A", ts())).unwrap();
        platform.advance(Duration::minutes(5));

        let reply = platform.reply("a", "Hi u/u1").await.unwrap();
        assert_eq!(reply.created, ts() + Duration::minutes(5));

        let post = platform.fetch_comment_tree("p", CommentSort::New).await.unwrap();
        assert_eq!(post.comments[0].replies[0].body, "Hi u/u1");
        assert!(post.comments[0].replies[0].is_authored_by("bot"));
    }

    #[tokio::test]
    async fn test_remove_marks_comment() {
        let platform = platform();
        platform.add_comment("p", Comment::new("a", Some("u1"), "A", ts())).unwrap();
        platform.add_comment("a", Comment::new("b", Some("u2"), "B", ts())).unwrap();

        platform.remove_comment("b").await.unwrap();
        assert!(platform.comment("b").unwrap().removed);
        assert_eq!(platform.removals(), vec!["b"]);
        assert!(platform.remove_comment("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_sort_orders() {
        let platform = platform();
        platform
            .add_comment("p", Comment::new("old", Some("u1"), "A", ts()).with_score(10))
            .unwrap();
        platform
            .add_comment("p", Comment::new("new", Some("u2"), "B", ts() + Duration::minutes(1)))
            .unwrap();

        let new = platform.fetch_top_level_comments("p", CommentSort::New).await.unwrap();
        assert_eq!(new[0].id, "new");
        let top = platform.fetch_top_level_comments("p", CommentSort::Top).await.unwrap();
        assert_eq!(top[0].id, "old");
    }

    #[tokio::test]
    async fn test_distinguish_post_and_comment() {
        let platform = platform();
        platform.add_comment("p", Comment::new("a", Some("bot"), "Reply here", ts())).unwrap();

        platform.distinguish("p", false).await.unwrap();
        platform.distinguish("a", true).await.unwrap();
        assert!(platform.post("p").unwrap().distinguished);
        let comment = platform.comment("a").unwrap();
        assert!(comment.distinguished && comment.stickied);
        assert!(platform.distinguish("missing", false).await.is_err());
    }

    #[tokio::test]
    async fn test_edited_document_is_read_back() {
        let platform = platform();
        platform.set_document("rules", "old", ts());
        platform.advance(Duration::hours(1));

        platform.edit_document("rules", "new", "update").await.unwrap();
        let document = platform.read_document("rules").await.unwrap();
        assert_eq!(document.content, "new");
        assert_eq!(document.revised, ts() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_failing_messages() {
        let platform = platform();
        platform.fail_messages(true);
        assert!(platform.message_user("asker", "s", "b").await.is_err());
        assert!(platform.actions().is_empty());
    }
}
