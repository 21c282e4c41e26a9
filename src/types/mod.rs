// src/types/mod.rs - Snapshot model of posts and comment trees

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A comment as fetched from the discussion platform.
///
/// The tree is a snapshot: replies are fully expanded by the platform layer
/// before the game engines see it, and nothing here is mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    /// `None` when the account was deleted.
    pub author: Option<String>,
    pub body: String,
    pub created: DateTime<Utc>,
    pub score: i64,
    pub stickied: bool,
    pub distinguished: bool,
    pub removed: bool,
    pub locked: bool,
    pub permalink: String,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

impl Comment {
    pub fn new(id: &str, author: Option<&str>, body: &str, created: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            author: author.map(str::to_string),
            body: body.to_string(),
            created,
            score: 1,
            stickied: false,
            distinguished: false,
            removed: false,
            locked: false,
            permalink: String::new(),
            replies: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    pub fn with_reply(mut self, reply: Comment) -> Self {
        self.replies.push(reply);
        self
    }

    pub fn is_authored_by(&self, name: &str) -> bool {
        self.author.as_deref() == Some(name)
    }

    /// Moderator content, pinned content and already removed comments take no
    /// part in either game.
    pub fn is_out_of_play(&self) -> bool {
        self.stickied || self.distinguished || self.removed
    }

    /// Ids of every descendant, depth first.
    pub fn descendant_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for reply in &self.replies {
            ids.push(reply.id.clone());
            ids.extend(reply.descendant_ids());
        }
        ids
    }
}

/// Taxonomy label currently attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFlair {
    pub text: String,
    pub css_class: Option<String>,
}

/// Flair to apply to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlairSpec {
    pub text: String,
    pub css_class: String,
    #[serde(default)]
    pub template_id: Option<String>,
}

impl FlairSpec {
    pub fn with_text(&self, text: String) -> Self {
        Self { text, ..self.clone() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub body: String,
    pub flair: Option<PostFlair>,
    pub created: DateTime<Utc>,
    pub stickied: bool,
    pub distinguished: bool,
    pub permalink: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Post {
    pub fn flair_text(&self) -> Option<&str> {
        self.flair.as_ref().map(|f| f.text.as_str()).filter(|t| !t.is_empty())
    }

    pub fn flair_css_class(&self) -> Option<&str> {
        self.flair.as_ref().and_then(|f| f.css_class.as_deref())
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created).num_seconds() as f64 / 3600.0
    }

    /// Comment with `id` anywhere in the forest.
    pub fn find_comment(&self, id: &str) -> Option<&Comment> {
        fn find<'c>(comments: &'c [Comment], id: &str) -> Option<&'c Comment> {
            comments
                .iter()
                .find_map(|c| if c.id == id { Some(c) } else { find(&c.replies, id) })
        }
        find(&self.comments, id)
    }
}

/// What a comment hangs off: either the post itself or another comment.
#[derive(Debug, Clone, Copy)]
pub enum CommentParent<'a> {
    Post(&'a Post),
    Comment(&'a Comment),
}

impl<'a> CommentParent<'a> {
    pub fn replies(&self) -> &'a [Comment] {
        match self {
            CommentParent::Post(post) => &post.comments,
            CommentParent::Comment(comment) => &comment.replies,
        }
    }

    pub fn author(&self) -> Option<&'a str> {
        match self {
            CommentParent::Post(post) => post.author.as_deref(),
            CommentParent::Comment(comment) => comment.author.as_deref(),
        }
    }
}

/// A page of the subreddit wiki used as a key-value document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiDocument {
    pub content: String,
    pub revised: DateTime<Utc>,
}

/// Sort orders understood by the platform when listing comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentSort {
    Top,
    New,
}

impl CommentSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSort::Top => "top",
            CommentSort::New => "new",
        }
    }
}

/// Failures the game engines distinguish between.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("solution {solution:?} does not fit revealed text {revealed:?}")]
    SolutionMismatch { solution: String, revealed: String },
    #[error("reveal document is malformed: {0}")]
    DocumentDrift(String),
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("platform call failed: {0}")]
    Platform(String),
}
