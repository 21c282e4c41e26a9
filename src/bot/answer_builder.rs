// src/bot/answer_builder.rs - Recursive walk that spells the answer of a post

use log::{debug, info};
use std::collections::HashMap;

use crate::bot::moderation::{
    resolve_duplicate_letter, resolve_duplicate_stop_word, CommentKind, DuplicateResolution, ModerationRules,
    RemovalReason, Verdict,
};
use crate::config::ScoreFloorConfig;
use crate::types::{Comment, CommentParent, Post};

/// Best completed chain found under a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedAnswer {
    /// Letters from the top of the chain down, uppercased.
    pub text: String,
    /// Score of the stop word closing the chain.
    pub score: i64,
    pub comment_id: String,
    pub permalink: String,
}

/// A comment the walk decided to take down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub comment_id: String,
    pub reason: RemovalReason,
    pub permalink: String,
    /// Every reply below the comment, filled for thread removals only.
    pub thread: Vec<String>,
}

impl Removal {
    fn of(comment: &Comment, reason: RemovalReason) -> Self {
        let thread = if reason.removes_thread() { comment.descendant_ids() } else { Vec::new() };
        Self {
            comment_id: comment.id.clone(),
            reason,
            permalink: comment.permalink.clone(),
            thread,
        }
    }
}

/// Decisions produced from one snapshot of a post.
#[derive(Debug, Clone, Default)]
pub struct TreeWalk {
    pub answer: Option<AcceptedAnswer>,
    pub removals: Vec<Removal>,
}

struct Candidate {
    /// Collected bottom-up, so deepest letter first.
    letters: Vec<String>,
    score: i64,
    comment_id: String,
    permalink: String,
}

impl Candidate {
    fn closing(stop_word: &Comment) -> Self {
        Self {
            letters: Vec::new(),
            score: stop_word.score,
            comment_id: stop_word.id.clone(),
            permalink: stop_word.permalink.clone(),
        }
    }

    fn into_answer(self) -> AcceptedAnswer {
        let text: String = self.letters.iter().rev().map(String::as_str).collect();
        AcceptedAnswer {
            text: text.to_uppercase(),
            score: self.score,
            comment_id: self.comment_id,
            permalink: self.permalink,
        }
    }
}

/// Keep the strictly higher score; the first one found wins ties.
fn better(current: Option<Candidate>, challenger: Candidate) -> Option<Candidate> {
    match current {
        Some(current) if current.score >= challenger.score => Some(current),
        _ => Some(challenger),
    }
}

pub struct AnswerBuilder<'a> {
    rules: &'a ModerationRules,
}

impl<'a> AnswerBuilder<'a> {
    pub fn new(rules: &'a ModerationRules) -> Self {
        Self { rules }
    }

    pub fn walk(&self, post: &Post) -> TreeWalk {
        let mut removals = Vec::new();
        let best = self.browse(CommentParent::Post(post), post.author.as_deref(), &mut removals);
        let answer = best.map(Candidate::into_answer);
        if let Some(ref answer) = answer {
            debug!("Post {} best answer {:?} with score {}", post.id, answer.text, answer.score);
        }
        TreeWalk { answer, removals }
    }

    fn browse(&self, parent: CommentParent<'_>, asker: Option<&str>, removals: &mut Vec<Removal>) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        let mut letters: HashMap<String, &Comment> = HashMap::new();
        let mut stop_word: Option<&Comment> = None;

        for comment in parent.replies() {
            let kind = match self.rules.judge(comment, parent, asker) {
                Verdict::Skip => continue,
                Verdict::RemoveThread(reason) | Verdict::Remove(reason) => {
                    info!("Deleting - {} - {}", reason, comment.permalink);
                    removals.push(Removal::of(comment, reason));
                    continue;
                }
                Verdict::Accept(kind) => kind,
            };

            match kind {
                CommentKind::StopWord => {
                    if let Some(existing) = stop_word {
                        let loser = match resolve_duplicate_stop_word(existing, comment) {
                            DuplicateResolution::RemoveIncoming => comment,
                            _ => existing,
                        };
                        info!("Deleting - {} - {}", RemovalReason::DuplicateStopWord, loser.permalink);
                        removals.push(Removal::of(loser, RemovalReason::DuplicateStopWord));
                        if std::ptr::eq(loser, comment) {
                            continue;
                        }
                    }
                    stop_word = Some(comment);
                }
                CommentKind::Letter(key) => {
                    if let Some(existing) = letters.get(&key) {
                        match resolve_duplicate_letter(existing, comment) {
                            DuplicateResolution::RemoveIncoming => {
                                info!("Deleting - {} - {}", RemovalReason::DuplicateLetter, comment.permalink);
                                removals.push(Removal::of(comment, RemovalReason::DuplicateLetter));
                                continue;
                            }
                            DuplicateResolution::ReplaceExisting => {
                                info!("Deleting - {} - {}", RemovalReason::DuplicateLetter, existing.permalink);
                                removals.push(Removal::of(existing, RemovalReason::DuplicateLetter));
                            }
                            DuplicateResolution::KeepBoth => {}
                        }
                    }
                    letters.insert(key.clone(), comment);

                    if let Some(mut candidate) = self.browse(CommentParent::Comment(comment), asker, removals) {
                        candidate.letters.push(key);
                        best = better(best, candidate);
                    }
                }
                CommentKind::Noise => {}
            }
        }

        // A stop word straight under the post would close an empty answer.
        if let (CommentParent::Comment(_), Some(stop_word)) = (parent, stop_word) {
            best = better(best, Candidate::closing(stop_word));
        }
        best
    }
}

/// Sliding bar for an answer on a post `age_hours` old.
pub fn score_bar(config: &ScoreFloorConfig, age_hours: f64) -> i64 {
    let bonus = config.young_bonus as f64 * (1.0 - age_hours / config.ramp_hours);
    (config.minimum as f64 + bonus).round() as i64
}

/// Young posts need more votes on the closing stop word; older posts take a
/// marginal answer.
pub fn passes_score_floor(config: &ScoreFloorConfig, score: i64, age_hours: f64) -> bool {
    !config.enabled || score >= config.minimum || score >= score_bar(config, age_hours)
}

/// Flair text for an answered post, elided to `max_len` characters.
pub fn answered_flair_text(prefix: &str, answer: &str, max_len: usize) -> String {
    let text = format!("{}{}", prefix, answer);
    if text.chars().count() <= max_len {
        return text;
    }
    let mut short: String = text.chars().take(max_len.saturating_sub(3)).collect();
    short.push_str("...");
    short
}
