use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Comment, CommentSort, FlairSpec, Post, WikiDocument};

pub mod memory;
pub mod reddit;

/// Everything the games need from the discussion platform.
///
/// Engines never call this directly while deciding; they read a snapshot and
/// return actions, and the bot applies those actions through this trait.
#[async_trait]
pub trait DiscussionPlatform: Send + Sync {
    /// Get the platform identifier (e.g., "reddit")
    fn platform_name(&self) -> &str;

    /// Name of the account the bot runs as.
    async fn current_user(&self) -> Result<String>;

    /// Newest posts of the community, without their comments.
    async fn fetch_new_posts(&self, limit: usize) -> Result<Vec<Post>>;

    /// Post with its whole comment forest, every "load more" resolved.
    async fn fetch_comment_tree(&self, post_id: &str, sort: CommentSort) -> Result<Post>;

    /// Top-level comments of a post in the given order, each with its
    /// direct replies.
    async fn fetch_top_level_comments(&self, post_id: &str, sort: CommentSort) -> Result<Vec<Comment>>;

    async fn remove_comment(&self, comment_id: &str) -> Result<()>;

    async fn reply(&self, parent_id: &str, body: &str) -> Result<Comment>;

    async fn lock_comment(&self, comment_id: &str) -> Result<()>;

    async fn set_flair(&self, post_id: &str, flair: &FlairSpec) -> Result<()>;

    async fn sticky_post(&self, post_id: &str, state: bool) -> Result<()>;

    async fn edit_post_body(&self, post_id: &str, body: &str) -> Result<()>;

    async fn message_user(&self, username: &str, subject: &str, body: &str) -> Result<()>;

    /// Write to the moderators of the community.
    async fn message_moderators(&self, subject: &str, body: &str) -> Result<()>;

    /// Mark a post or comment as moderator content; `sticky` pins a comment
    /// to the top of its post.
    async fn distinguish(&self, thing_id: &str, sticky: bool) -> Result<()>;

    /// Read a wiki page used as a document store.
    async fn read_document(&self, page: &str) -> Result<WikiDocument>;

    async fn edit_document(&self, page: &str, content: &str, reason: &str) -> Result<()>;

    async fn submit_post(&self, title: &str, body: &str) -> Result<Post>;
}
