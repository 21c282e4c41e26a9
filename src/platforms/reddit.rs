use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::env;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::Url;

use crate::platforms::DiscussionPlatform;
use crate::types::{Comment, CommentSort, FlairSpec, GameError, Post, PostFlair, WikiDocument};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const WEB_BASE: &str = "https://www.reddit.com";
const MORE_CHILDREN_BATCH: usize = 100;
const MAX_EXPANSION_ROUNDS: usize = 50;

/// Reddit listing structures
#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", content = "data")]
enum Thing {
    #[serde(rename = "t1")]
    Comment(RawComment),
    #[serde(rename = "t3")]
    Link(RawLink),
    #[serde(rename = "more")]
    More(RawMore),
}

#[derive(Debug, Deserialize)]
struct RawComment {
    name: String,
    author: String,
    #[serde(default)]
    body: String,
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    stickied: bool,
    distinguished: Option<String>,
    #[serde(default)]
    removed: bool,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    permalink: String,
    parent_id: String,
    #[serde(default, deserialize_with = "replies_listing")]
    replies: Option<Listing>,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    id: String,
    title: String,
    author: String,
    #[serde(default)]
    selftext: String,
    link_flair_text: Option<String>,
    link_flair_css_class: Option<String>,
    created_utc: f64,
    #[serde(default)]
    stickied: bool,
    distinguished: Option<String>,
    #[serde(default)]
    permalink: String,
}

#[derive(Debug, Deserialize)]
struct RawMore {
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    parent_id: String,
}

/// Comments a listing did not include.
#[derive(Debug, Default, PartialEq, Eq)]
struct Expansion {
    /// Ids to resolve through `morechildren`.
    children: Vec<String>,
    /// Parents cut off by "continue this thread"; their replies need a
    /// fresh request rooted at the parent.
    threads: Vec<String>,
}

impl Expansion {
    fn push(&mut self, more: RawMore) {
        if more.children.is_empty() {
            if more.parent_id.starts_with("t1_") && !self.threads.contains(&more.parent_id) {
                self.threads.push(more.parent_id);
            }
        } else {
            self.children.extend(more.children);
        }
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.threads.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct WikiPageResponse {
    data: WikiPageData,
}

#[derive(Debug, Deserialize)]
struct WikiPageData {
    content_md: String,
    revision_date: f64,
}

/// Reddit sends `""` instead of an empty listing when a comment has no replies.
fn replies_listing<'de, D>(deserializer: D) -> std::result::Result<Option<Listing>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_object() {
        serde_json::from_value(value).map(Some).map_err(serde::de::Error::custom)
    } else {
        Ok(None)
    }
}

fn timestamp(seconds: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds as i64, 0).single().unwrap_or_else(Utc::now)
}

fn author_name(raw: String) -> Option<String> {
    if raw == "[deleted]" || raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

/// Configuration for the Reddit connection
#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub subreddit: String,
}

impl RedditConfig {
    /// Load Reddit credentials from environment variables
    pub fn from_env(subreddit: &str, user_agent: &str) -> Result<Self> {
        let client_id = env::var("REDDIT_CLIENT_ID").context("REDDIT_CLIENT_ID environment variable not set")?;
        let client_secret =
            env::var("REDDIT_CLIENT_SECRET").context("REDDIT_CLIENT_SECRET environment variable not set")?;
        let username = env::var("REDDIT_USERNAME").context("REDDIT_USERNAME environment variable not set")?;
        let password = env::var("REDDIT_PASSWORD").context("REDDIT_PASSWORD environment variable not set")?;
        let user_agent = env::var("REDDIT_USER_AGENT").unwrap_or_else(|_| format!("{} (by /u/{})", user_agent, username));

        info!("Loaded Reddit config for u/{} on r/{}", username, subreddit);

        Ok(Self {
            client_id,
            client_secret,
            username,
            password,
            user_agent,
            subreddit: subreddit.to_string(),
        })
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Reddit OAuth API connection
pub struct RedditConnection {
    config: RedditConfig,
    http_client: reqwest::Client,
    token: RwLock<Option<AccessToken>>,
}

impl RedditConnection {
    pub fn new(config: RedditConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            http_client,
            token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting new Reddit access token");
        let response = self
            .http_client
            .post(TOKEN_URL)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach Reddit token endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("Reddit authentication failed {}: {}", status, error_text));
        }

        let token: TokenResponse = response.json().await.context("Failed to parse Reddit token response")?;
        // Refresh a minute early.
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        let value = token.access_token.clone();
        *self.token.write().await = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    fn api_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", API_BASE, path))?;
        url.query_pairs_mut().append_pair("raw_json", "1");
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.api_url(path, query)?;
        debug!("GET {}", url);
        let response = self
            .http_client
            .get(url)
            .bearer_auth(self.access_token().await?)
            .send()
            .await
            .with_context(|| format!("Failed to GET {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("Reddit API error {} on {}: {}", status, path, error_text));
        }
        response.json().await.with_context(|| format!("Failed to parse response of {}", path))
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<serde_json::Value> {
        let url = self.api_url(path, &[])?;
        debug!("POST {}", url);
        let response = self
            .http_client
            .post(url)
            .bearer_auth(self.access_token().await?)
            .form(form)
            .send()
            .await
            .with_context(|| format!("Failed to POST {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("Reddit API error {} on {}: {}", status, path, error_text));
        }

        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        if let Some(errors) = body.pointer("/json/errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                return Err(GameError::Platform(format!("Reddit rejected {}: {:?}", path, errors)).into());
            }
        }
        Ok(body)
    }

    fn convert_link(&self, raw: RawLink) -> Post {
        let flair = raw.link_flair_text.map(|text| PostFlair {
            text,
            css_class: raw.link_flair_css_class,
        });
        Post {
            id: raw.id,
            title: raw.title,
            author: author_name(raw.author),
            body: raw.selftext,
            flair,
            created: timestamp(raw.created_utc),
            stickied: raw.stickied,
            distinguished: raw.distinguished.is_some(),
            permalink: format!("{}{}", WEB_BASE, raw.permalink),
            comments: Vec::new(),
        }
    }

    /// Convert a listing into comments, collecting what is hidden behind "more".
    fn convert_comments(&self, listing: Option<Listing>, more: &mut Expansion) -> Vec<Comment> {
        let Some(listing) = listing else {
            return Vec::new();
        };
        let mut comments = Vec::new();
        for thing in listing.data.children {
            match thing {
                Thing::Comment(raw) => comments.push(self.convert_comment(raw, more)),
                Thing::More(raw) => more.push(raw),
                Thing::Link(_) => {}
            }
        }
        comments
    }

    fn convert_comment(&self, raw: RawComment, more: &mut Expansion) -> Comment {
        let replies = self.convert_comments(raw.replies, more);
        Comment {
            id: raw.name,
            author: author_name(raw.author),
            body: raw.body,
            created: timestamp(raw.created_utc),
            score: raw.score,
            stickied: raw.stickied,
            distinguished: raw.distinguished.is_some(),
            removed: raw.removed,
            locked: raw.locked,
            permalink: format!("{}{}", WEB_BASE, raw.permalink),
            replies,
        }
    }

    /// Resolve every "load more" and "continue this thread" stub of a post
    /// and graft the results.
    async fn expand_more(&self, post: &mut Post, mut pending: Expansion, sort: CommentSort) -> Result<()> {
        let link_id = format!("t3_{}", post.id);
        let mut rounds = 0;

        while !pending.is_empty() {
            rounds += 1;
            if rounds > MAX_EXPANSION_ROUNDS {
                warn!("Giving up expanding comments of {} after {} rounds", post.id, MAX_EXPANSION_ROUNDS);
                break;
            }

            if let Some(parent) = pending.threads.pop() {
                let listing = self.fetch_thread(&post.id, &parent, sort).await?;
                let grafted = self.graft_thread(post, &parent, listing, &mut pending);
                debug!("Grafted {} replies under {}", grafted, parent);
                continue;
            }

            let batch: Vec<String> = pending
                .children
                .drain(..pending.children.len().min(MORE_CHILDREN_BATCH))
                .collect();
            let children = batch.join(",");
            let body: serde_json::Value = self
                .get_json(
                    "/api/morechildren",
                    &[
                        ("api_type", "json"),
                        ("link_id", link_id.as_str()),
                        ("children", children.as_str()),
                        ("sort", sort.as_str()),
                    ],
                )
                .await?;

            let things = body.pointer("/json/data/things").cloned().unwrap_or(serde_json::Value::Array(Vec::new()));
            let things: Vec<Thing> = serde_json::from_value(things).context("Failed to parse morechildren")?;
            self.graft_things(post, &link_id, things, &mut pending);
        }
        Ok(())
    }

    /// Comment page rooted at `parent`, the way Reddit serves "continue this
    /// thread" links.
    async fn fetch_thread(&self, post_id: &str, parent: &str, sort: CommentSort) -> Result<Option<Listing>> {
        let path = format!("/comments/{}", post_id);
        let focus = parent.trim_start_matches("t1_");
        let mut listings: Vec<Listing> = self
            .get_json(&path, &[("comment", focus), ("sort", sort.as_str()), ("limit", "500")])
            .await?;
        Ok(listings.pop())
    }

    /// Attach the replies of `parent` found in a page rooted at it. Returns
    /// how many were added; replies already in the tree are kept as they are.
    fn graft_thread(&self, post: &mut Post, parent: &str, listing: Option<Listing>, pending: &mut Expansion) -> usize {
        let focus = self
            .convert_comments(listing, pending)
            .into_iter()
            .find(|c| c.id == parent);
        let Some(focus) = focus else {
            warn!("Thread under {} not returned", parent);
            return 0;
        };
        let Some(node) = find_comment(&mut post.comments, parent) else {
            warn!("Dropping thread under unknown comment {}", parent);
            return 0;
        };

        let mut added = 0;
        for reply in focus.replies {
            if node.replies.iter().all(|r| r.id != reply.id) {
                node.replies.push(reply);
                added += 1;
            }
        }
        added
    }

    /// `morechildren` returns a flat list in tree order; group it by parent,
    /// then attach.
    fn graft_things(&self, post: &mut Post, link_id: &str, things: Vec<Thing>, pending: &mut Expansion) {
        let mut by_parent: HashMap<String, Vec<Comment>> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for thing in things {
            match thing {
                Thing::Comment(raw) => {
                    let parent = raw.parent_id.clone();
                    let comment = self.convert_comment(raw, pending);
                    if !by_parent.contains_key(&parent) {
                        order.push(parent.clone());
                    }
                    by_parent.entry(parent).or_default().push(comment);
                }
                Thing::More(raw) => pending.push(raw),
                Thing::Link(_) => {}
            }
        }

        // Children may point at comments delivered in the same batch.
        for parent in order.iter().rev() {
            let Some(children) = by_parent.remove(parent) else {
                continue;
            };
            let mut children = Some(children);
            for siblings in by_parent.values_mut() {
                if let Some(node) = find_comment(siblings, parent) {
                    node.replies.extend(children.take().unwrap_or_default());
                    break;
                }
            }
            if let Some(children) = children {
                if parent == link_id {
                    post.comments.extend(children);
                } else if let Some(node) = find_comment(&mut post.comments, parent) {
                    node.replies.extend(children);
                } else {
                    warn!("Dropping {} comments with unknown parent {}", children.len(), parent);
                }
            }
        }
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

fn fullname(id: &str, kind: &str) -> String {
    if id.starts_with("t1_") || id.starts_with("t3_") {
        id.to_string()
    } else {
        format!("{}_{}", kind, id)
    }
}

#[async_trait]
impl DiscussionPlatform for RedditConnection {
    fn platform_name(&self) -> &str {
        "reddit"
    }

    async fn current_user(&self) -> Result<String> {
        let me: serde_json::Value = self.get_json("/api/v1/me", &[]).await?;
        me.get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string)
            .context("Reddit did not return the account name")
    }

    async fn fetch_new_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let path = format!("/r/{}/new", self.config.subreddit);
        let limit = limit.to_string();
        let listing: Listing = self.get_json(&path, &[("limit", limit.as_str())]).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter_map(|thing| match thing {
                Thing::Link(raw) => Some(self.convert_link(raw)),
                _ => None,
            })
            .collect())
    }

    async fn fetch_comment_tree(&self, post_id: &str, sort: CommentSort) -> Result<Post> {
        let path = format!("/comments/{}", post_id);
        let mut listings: Vec<Listing> = self
            .get_json(&path, &[("sort", sort.as_str()), ("limit", "500")])
            .await?;
        if listings.len() != 2 {
            return Err(anyhow::anyhow!("Unexpected comment page shape for {}", post_id));
        }
        let comments_listing = listings.pop();
        let mut post = listings
            .pop()
            .and_then(|l| l.data.children.into_iter().next())
            .and_then(|thing| match thing {
                Thing::Link(raw) => Some(self.convert_link(raw)),
                _ => None,
            })
            .with_context(|| format!("Post {} not found", post_id))?;

        let mut more = Expansion::default();
        post.comments = self.convert_comments(comments_listing, &mut more);
        if !more.is_empty() {
            debug!(
                "Expanding {} hidden comments and {} cut threads of {}",
                more.children.len(),
                more.threads.len(),
                post_id
            );
            self.expand_more(&mut post, more, sort).await?;
        }
        Ok(post)
    }

    async fn fetch_top_level_comments(&self, post_id: &str, sort: CommentSort) -> Result<Vec<Comment>> {
        Ok(self.fetch_comment_tree(post_id, sort).await?.comments)
    }

    async fn remove_comment(&self, comment_id: &str) -> Result<()> {
        let id = fullname(comment_id, "t1");
        self.post_form("/api/remove", &[("id", id.as_str()), ("spam", "false")]).await?;
        Ok(())
    }

    async fn reply(&self, parent_id: &str, body: &str) -> Result<Comment> {
        // Comment ids are already fullnames; a bare id is a post.
        let thing_id = fullname(parent_id, "t3");
        let response = self
            .post_form(
                "/api/comment",
                &[("api_type", "json"), ("thing_id", thing_id.as_str()), ("text", body)],
            )
            .await?;
        let thing = response
            .pointer("/json/data/things/0")
            .cloned()
            .context("Reddit did not return the new comment")?;
        let thing: Thing = serde_json::from_value(thing).context("Failed to parse new comment")?;
        match thing {
            Thing::Comment(raw) => Ok(self.convert_comment(raw, &mut Expansion::default())),
            _ => Err(anyhow::anyhow!("Reply to {} did not create a comment", parent_id)),
        }
    }

    async fn lock_comment(&self, comment_id: &str) -> Result<()> {
        let id = fullname(comment_id, "t1");
        self.post_form("/api/lock", &[("id", id.as_str())]).await?;
        Ok(())
    }

    async fn set_flair(&self, post_id: &str, flair: &FlairSpec) -> Result<()> {
        let path = format!("/r/{}/api/selectflair", self.config.subreddit);
        let link = fullname(post_id, "t3");
        let mut form = vec![
            ("api_type", "json"),
            ("link", link.as_str()),
            ("text", flair.text.as_str()),
            ("css_class", flair.css_class.as_str()),
        ];
        if let Some(template) = flair.template_id.as_deref() {
            form.push(("flair_template_id", template));
        }
        self.post_form(&path, &form).await?;
        Ok(())
    }

    async fn sticky_post(&self, post_id: &str, state: bool) -> Result<()> {
        let id = fullname(post_id, "t3");
        let state = if state { "true" } else { "false" };
        self.post_form("/api/set_subreddit_sticky", &[("api_type", "json"), ("id", id.as_str()), ("state", state)])
            .await?;
        Ok(())
    }

    async fn edit_post_body(&self, post_id: &str, body: &str) -> Result<()> {
        let id = fullname(post_id, "t3");
        self.post_form("/api/editusertext", &[("api_type", "json"), ("thing_id", id.as_str()), ("text", body)])
            .await?;
        Ok(())
    }

    async fn message_user(&self, username: &str, subject: &str, body: &str) -> Result<()> {
        self.post_form(
            "/api/compose",
            &[("api_type", "json"), ("to", username), ("subject", subject), ("text", body)],
        )
        .await?;
        Ok(())
    }

    async fn message_moderators(&self, subject: &str, body: &str) -> Result<()> {
        let to = format!("/r/{}", self.config.subreddit);
        self.message_user(&to, subject, body).await
    }

    async fn distinguish(&self, thing_id: &str, sticky: bool) -> Result<()> {
        let id = fullname(thing_id, "t3");
        let mut form = vec![("api_type", "json"), ("id", id.as_str()), ("how", "yes")];
        if sticky {
            form.push(("sticky", "true"));
        }
        self.post_form("/api/distinguish", &form).await?;
        Ok(())
    }

    async fn read_document(&self, page: &str) -> Result<WikiDocument> {
        let path = format!("/r/{}/wiki/{}", self.config.subreddit, page);
        let response: WikiPageResponse = self.get_json(&path, &[]).await?;
        Ok(WikiDocument {
            content: response.data.content_md,
            revised: timestamp(response.data.revision_date),
        })
    }

    async fn edit_document(&self, page: &str, content: &str, reason: &str) -> Result<()> {
        let path = format!("/r/{}/api/wiki/edit", self.config.subreddit);
        self.post_form(&path, &[("page", page), ("content", content), ("reason", reason)])
            .await?;
        info!("Edited wiki page {} ({})", page, reason);
        Ok(())
    }

    async fn submit_post(&self, title: &str, body: &str) -> Result<Post> {
        let response = self
            .post_form(
                "/api/submit",
                &[
                    ("api_type", "json"),
                    ("sr", self.config.subreddit.as_str()),
                    ("kind", "self"),
                    ("title", title),
                    ("text", body),
                ],
            )
            .await?;
        let id = response
            .pointer("/json/data/id")
            .and_then(|v| v.as_str())
            .context("Reddit did not return the new post id")?
            .to_string();
        info!("Submitted post {} to r/{}", id, self.config.subreddit);
        self.fetch_comment_tree(&id, CommentSort::New).await
    }
}
