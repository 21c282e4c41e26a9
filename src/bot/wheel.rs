// src/bot/wheel.rs - Flat reveal game: single letters and whole phrases
// against a hidden phrase, with state kept in the post body

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

use crate::bot::ack::{self, AckStatus};
use crate::bot::actions::{apply_actions, BotAction};
use crate::bot::moderation::ModerationRules;
use crate::bot::normalizer::{normalize_char, relaxed_equal};
use crate::bot::rate_limiter::{AttemptKind, RateLimitPolicy, RateLimiter};
use crate::bot::reveal_document::{is_in_alphabet, mask, overlay, word_lengths, RevealDocument};
use crate::config::WheelConfig;
use crate::platforms::DiscussionPlatform;
use crate::types::{Comment, CommentSort, GameError, Post};

/// Result of one poll of an in-progress post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WheelOutcome {
    Unchanged,
    Progress { revealed: String, missing: BTreeSet<char> },
    Solved { winner: String },
}

#[derive(Debug, Clone)]
pub struct WheelPoll {
    pub outcome: WheelOutcome,
    pub actions: Vec<BotAction>,
}

/// A comment nobody answered yet.
struct Guess<'c> {
    comment: &'c Comment,
    user: String,
    /// Trimmed and uppercased body.
    text: String,
}

/// Fill a reply template.
pub fn render_message(template: &str, user: &str, body: &str, revealed: usize) -> String {
    template
        .replace("$(user)", user)
        .replace("$(body)", body)
        .replace("$(revealed)", &revealed.to_string())
}

/// Title of a new game: the prefix and the length of every word.
pub fn game_title(prefix: &str, solution: &str, alphabet: &str) -> String {
    let lengths: Vec<String> = word_lengths(solution, alphabet).iter().map(|n| n.to_string()).collect();
    format!("{} - {}", prefix, lengths.join(" "))
}

/// Decides what to do with the comments of one in-progress post.
pub struct WheelEngine<'a> {
    config: &'a WheelConfig,
    policy: RateLimitPolicy,
    bot_name: &'a str,
}

impl<'a> WheelEngine<'a> {
    pub fn new(config: &'a WheelConfig, bot_name: &'a str) -> Self {
        Self {
            config,
            policy: RateLimitPolicy::from_config(config),
            bot_name,
        }
    }

    /// `comments` are the top-level comments of `post`, each with its direct
    /// replies. Nothing is applied here.
    pub fn poll(
        &self,
        post: &Post,
        comments: &[Comment],
        solution: &str,
        now: DateTime<Utc>,
    ) -> Result<WheelPoll, GameError> {
        let document = RevealDocument::parse(&post.body)?;
        let solution = solution.trim().to_uppercase();
        let current = document.revealed().to_string();
        if solution.chars().count() != current.chars().count() {
            return Err(GameError::SolutionMismatch { solution, revealed: current });
        }

        let mut limiter = RateLimiter::new(self.policy, now);
        let mut phrases = Vec::new();
        let mut letters = Vec::new();

        for comment in comments {
            if comment.is_out_of_play() || comment.is_authored_by(self.bot_name) {
                continue;
            }
            let cleaned: String = ModerationRules::clean_body(&comment.body).nfc().collect();
            let kind = if cleaned.graphemes(true).count() > 1 {
                AttemptKind::Phrase
            } else {
                AttemptKind::Letter
            };

            match ack::detect(comment, self.bot_name) {
                AckStatus::New => {}
                AckStatus::Attributed { username, acked_at } => {
                    limiter.record_ack(Some(&username), kind, acked_at);
                    continue;
                }
                AckStatus::Unattributed { acked_at } => {
                    limiter.record_ack(None, kind, acked_at);
                    continue;
                }
            }

            let Some(user) = comment.author.clone() else {
                continue;
            };
            let guess = Guess {
                comment,
                user,
                text: cleaned.to_uppercase(),
            };
            match kind {
                AttemptKind::Phrase => phrases.push(guess),
                AttemptKind::Letter => letters.push(guess),
            }
        }

        phrases.sort_by_key(|g| g.comment.created);
        letters.sort_by_key(|g| g.comment.created);
        debug!(
            "Post {}: {} new phrases, {} new letters, last activity {:?}",
            post.id,
            phrases.len(),
            letters.len(),
            limiter.last_activity()
        );

        let mut actions = Vec::new();
        let messages = &self.config.messages;
        let revealed_count: usize = current
            .chars()
            .filter(|c| is_in_alphabet(*c, &self.config.alphabet))
            .collect::<BTreeSet<char>>()
            .len();

        for guess in &phrases {
            if !limiter.check(&guess.user, AttemptKind::Phrase).is_allowed() {
                info!("u/{} over the phrase limit on {}", guess.user, post.id);
                self.reply(&mut actions, guess, &messages.phrase_limit, revealed_count);
                actions.push(BotAction::remove(&guess.comment.id, "phrase limit"));
                continue;
            }
            limiter.record_attempt(&guess.user, AttemptKind::Phrase);

            if relaxed_equal(&guess.text, &solution) {
                info!("u/{} solved {} with {:?}", guess.user, post.id, guess.text);
                self.reply(&mut actions, guess, &messages.phrase_correct, revealed_count);
                actions.push(BotAction::SetFlair {
                    post_id: post.id.clone(),
                    flair: self.config.solved_flair.clone(),
                });
                actions.push(BotAction::Sticky {
                    post_id: post.id.clone(),
                    state: false,
                });
                actions.push(BotAction::EditBody {
                    post_id: post.id.clone(),
                    body: document.with_solution(&solution, &self.config.solved_label, &guess.user),
                });
                return Ok(WheelPoll {
                    outcome: WheelOutcome::Solved {
                        winner: guess.user.clone(),
                    },
                    actions,
                });
            }
            self.reply(&mut actions, guess, &messages.phrase_incorrect, revealed_count);
        }

        let known_missing = document.missing();
        let mut missing = known_missing.clone();
        let mut to_reveal: BTreeSet<String> = BTreeSet::new();

        for guess in &letters {
            if !limiter.check(&guess.user, AttemptKind::Letter).is_allowed() {
                info!("u/{} over the letter limit on {}", guess.user, post.id);
                self.reply(&mut actions, guess, &messages.letter_limit, revealed_count);
                actions.push(BotAction::remove(&guess.comment.id, "letter limit"));
                continue;
            }

            let mut chars = guess.text.chars();
            let letter = match (chars.next(), chars.next()) {
                (Some(c), None) if is_in_alphabet(c, &self.config.alphabet) => c,
                _ => {
                    info!("u/{} sent invalid letter {:?} on {}", guess.user, guess.text, post.id);
                    self.reply(&mut actions, guess, &messages.letter_invalid, revealed_count);
                    actions.push(BotAction::remove(&guess.comment.id, "invalid letter"));
                    continue;
                }
            };
            limiter.record_attempt(&guess.user, AttemptKind::Letter);

            let key = normalize_char(letter);
            if solution.chars().any(|s| normalize_char(s) == key) {
                self.reply(&mut actions, guess, &messages.letter_present, revealed_count);
                to_reveal.insert(key);
            } else {
                self.reply(&mut actions, guess, &messages.letter_absent, revealed_count);
                missing.insert(letter);
            }
        }

        let revealed = overlay(&solution, &current, &to_reveal);
        if revealed == current && missing == known_missing {
            return Ok(WheelPoll {
                outcome: WheelOutcome::Unchanged,
                actions,
            });
        }

        debug!("Post {} revealed {:?}, missing {:?}", post.id, revealed, missing);
        actions.push(BotAction::EditBody {
            post_id: post.id.clone(),
            body: document.with_progress(&revealed, &missing),
        });
        Ok(WheelPoll {
            outcome: WheelOutcome::Progress { revealed, missing },
            actions,
        })
    }

    fn reply(&self, actions: &mut Vec<BotAction>, guess: &Guess<'_>, template: &str, revealed: usize) {
        let body = render_message(template, &guess.user, &guess.text, revealed);
        actions.push(BotAction::reply(&guess.comment.id, body, true));
    }
}

/// Opens, polls and closes flat games on the community.
pub struct WheelGame {
    platform: Arc<dyn DiscussionPlatform>,
    config: WheelConfig,
    bot_name: String,
}

impl WheelGame {
    pub fn new(platform: Arc<dyn DiscussionPlatform>, config: WheelConfig, bot_name: String) -> Self {
        Self {
            platform,
            config,
            bot_name,
        }
    }

    async fn solution(&self) -> Result<(String, DateTime<Utc>)> {
        let document = self.platform.read_document(&self.config.solution_page).await?;
        Ok((document.content.trim().to_uppercase(), document.revised))
    }

    /// Start a new game for the current solution.
    pub async fn open(&self) -> Result<Post> {
        let (solution, _) = self.solution().await?;
        let title = game_title(&self.config.title_prefix, &solution, &self.config.alphabet);
        let body = RevealDocument::render_new(
            &self.config.intro,
            &mask(&solution, &self.config.alphabet, self.config.placeholder),
            &self.config.missing_label,
            &self.config.rules,
        );

        let post = self.platform.submit_post(&title, &body).await?;
        let actions = [
            BotAction::SetFlair {
                post_id: post.id.clone(),
                flair: self.config.in_progress_flair.clone(),
            },
            BotAction::Sticky {
                post_id: post.id.clone(),
                state: true,
            },
        ];
        apply_actions(self.platform.as_ref(), &actions).await;
        info!("Opened {} - {}", post.id, title);
        Ok(post)
    }

    /// Poll the live game if there is one. Returns whether a live game, or a
    /// finished game for the current solution, was found.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<bool> {
        let (solution, _) = self.solution().await?;
        let posts = self.platform.fetch_new_posts(self.config.new_posts_limit).await?;

        for post in posts {
            let Some(flair) = post.flair_text() else {
                continue;
            };

            if flair == self.config.in_progress_flair.text {
                self.poll_post(&post, &solution, now).await?;
                return Ok(true);
            }

            if flair == self.config.solved_flair.text {
                match RevealDocument::parse(&post.body) {
                    Ok(document) if document.revealed().contains(&solution) => {
                        debug!("Found solved game {}", post.id);
                        return Ok(true);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping solved post {}: {}", post.id, e),
                }
            }
        }
        Ok(false)
    }

    async fn poll_post(&self, post: &Post, solution: &str, now: DateTime<Utc>) -> Result<()> {
        let comments = self.platform.fetch_top_level_comments(&post.id, CommentSort::New).await?;
        let engine = WheelEngine::new(&self.config, &self.bot_name);

        match engine.poll(post, &comments, solution, now) {
            Ok(poll) => {
                let report = apply_actions(self.platform.as_ref(), &poll.actions).await;
                info!(
                    "Polled {}: {:?}, {} actions applied, {} failed",
                    post.id, poll.outcome, report.applied, report.failed
                );
            }
            Err(e) => error!("Cannot process {}: {}", post.id, e),
        }
        Ok(())
    }

    /// Poll the live game, or open a new one when the solution is fresh and
    /// no game for it exists.
    pub async fn work(&self, now: DateTime<Utc>) -> Result<()> {
        let (_, revised) = self.solution().await?;
        if now - revised > Duration::hours(self.config.solution_max_age_hours) {
            debug!("Solution last revised {}, nothing to do", revised);
            return Ok(());
        }
        if !self.check(now).await? {
            self.open().await?;
        }
        Ok(())
    }
}
