// src/bot/moderation.rs - Anti-cheat and duplicate rules for answer comments

use log::debug;
use regex::{Regex, RegexBuilder};
use std::fmt;
use unicode_segmentation::UnicodeSegmentation;

use crate::types::{Comment, CommentParent, GameError};

/// What a comment body contributes to an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentKind {
    /// Exactly one user-perceived character, kept as typed.
    Letter(String),
    /// Terminal word that closes the chain above it.
    StopWord,
    /// Anything else.
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    AskerAnswering,
    SelfChain,
    Noise,
    DuplicateLetter,
    DuplicateStopWord,
}

impl RemovalReason {
    /// Thread removals take the whole reply subtree with them.
    pub fn removes_thread(&self) -> bool {
        matches!(self, RemovalReason::AskerAnswering | RemovalReason::SelfChain)
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RemovalReason::AskerAnswering => "OP = author",
            RemovalReason::SelfChain => "parent = author",
            RemovalReason::Noise => "length <> 1",
            RemovalReason::DuplicateLetter => "duplicated",
            RemovalReason::DuplicateStopWord => "duplicated stop word",
        };
        write!(f, "{}", text)
    }
}

/// Outcome of the per-comment rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Not game content; neither processed nor removed.
    Skip,
    /// Remove the comment and every reply below it.
    RemoveThread(RemovalReason),
    /// Remove only this comment.
    Remove(RemovalReason),
    /// Valid content, subject to the duplicate policy.
    Accept(CommentKind),
}

/// How to settle two siblings carrying the same letter or both carrying a
/// stop word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateResolution {
    RemoveIncoming,
    ReplaceExisting,
    KeepBoth,
}

pub struct ModerationRules {
    stop_word: Regex,
}

impl ModerationRules {
    pub fn new(stop_words: &[String]) -> Result<Self, GameError> {
        let alternatives: Vec<String> = stop_words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(regex::escape)
            .collect();
        let pattern = format!("^(?:{})", alternatives.join("|"));
        let stop_word = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| GameError::InvalidPattern { pattern: pattern.clone(), reason: e.to_string() })?;
        Ok(Self { stop_word })
    }

    /// Body without surrounding whitespace and the markdown escape some
    /// clients put in front of punctuation.
    pub fn clean_body(body: &str) -> &str {
        body.trim().trim_start_matches('\\')
    }

    pub fn classify(&self, body: &str) -> CommentKind {
        let body = Self::clean_body(body);
        if self.stop_word.is_match(body) {
            CommentKind::StopWord
        } else if body.graphemes(true).count() == 1 {
            CommentKind::Letter(body.to_string())
        } else {
            CommentKind::Noise
        }
    }

    /// Skip rules shared by both games: moderator, pinned, removed and
    /// deleted-author comments are never game content.
    pub fn is_eligible(comment: &Comment) -> bool {
        !comment.is_out_of_play() && comment.author.is_some()
    }

    /// Apply the tree-game rules to `comment`, a direct reply of `parent`.
    pub fn judge(&self, comment: &Comment, parent: CommentParent<'_>, asker: Option<&str>) -> Verdict {
        if !Self::is_eligible(comment) {
            return Verdict::Skip;
        }
        let author = comment.author.as_deref();
        if asker.is_some() && author == asker {
            return Verdict::RemoveThread(RemovalReason::AskerAnswering);
        }
        if parent.author().is_some() && author == parent.author() {
            return Verdict::RemoveThread(RemovalReason::SelfChain);
        }
        match self.classify(&comment.body) {
            CommentKind::Noise => Verdict::Remove(RemovalReason::Noise),
            kind => Verdict::Accept(kind),
        }
    }
}

/// Branches that already have replies are never pruned in favour of a leaf;
/// between two leaves the older one stays.
pub fn resolve_duplicate_letter(existing: &Comment, incoming: &Comment) -> DuplicateResolution {
    let resolution = match (existing.replies.is_empty(), incoming.replies.is_empty()) {
        (false, false) => DuplicateResolution::KeepBoth,
        (false, true) => DuplicateResolution::RemoveIncoming,
        (true, false) => DuplicateResolution::ReplaceExisting,
        (true, true) => {
            if incoming.created < existing.created {
                DuplicateResolution::ReplaceExisting
            } else {
                DuplicateResolution::RemoveIncoming
            }
        }
    };
    debug!("Duplicate letter {} vs {}: {:?}", existing.id, incoming.id, resolution);
    resolution
}

/// Higher score wins; on a tie the earlier comment wins; on a full tie the
/// one already seen stays.
pub fn resolve_duplicate_stop_word(existing: &Comment, incoming: &Comment) -> DuplicateResolution {
    let incoming_wins = incoming.score > existing.score
        || (incoming.score == existing.score && incoming.created < existing.created);
    if incoming_wins {
        DuplicateResolution::ReplaceExisting
    } else {
        DuplicateResolution::RemoveIncoming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn ts(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap().with_timezone(&Utc) + Duration::minutes(minutes)
    }

    fn rules() -> ModerationRules {
        ModerationRules::new(&["Goodbye".to_string(), "Arrivederci".to_string(), "Addio".to_string()]).unwrap()
    }

    #[test]
    fn test_classify() {
        let rules = rules();
        assert_eq!(rules.classify(" a "), CommentKind::Letter("a".to_string()));
        assert_eq!(rules.classify("\\*"), CommentKind::Letter("*".to_string()));
        assert_eq!(rules.classify("È"), CommentKind::Letter("È".to_string()));
        assert_eq!(rules.classify("e\u{0301}"), CommentKind::Letter("e\u{0301}".to_string()));
        assert_eq!(rules.classify("👍🏽"), CommentKind::Letter("👍🏽".to_string()));
        assert_eq!(rules.classify("GOODBYE"), CommentKind::StopWord);
        assert_eq!(rules.classify("addio amici"), CommentKind::StopWord);
        assert_eq!(rules.classify("ab"), CommentKind::Noise);
        assert_eq!(rules.classify(""), CommentKind::Noise);
        assert_eq!(rules.classify("say goodbye"), CommentKind::Noise);
    }

    #[test]
    fn test_judge_skips_out_of_play() {
        let rules = rules();
        let parent = Comment::new("p", Some("u1"), "A", ts(0));

        let mut sticky = Comment::new("c", Some("u2"), "B", ts(1));
        sticky.stickied = true;
        assert_eq!(rules.judge(&sticky, CommentParent::Comment(&parent), Some("asker")), Verdict::Skip);

        let deleted = Comment::new("d", None, "B", ts(1));
        assert_eq!(rules.judge(&deleted, CommentParent::Comment(&parent), Some("asker")), Verdict::Skip);

        let mut removed = Comment::new("r", Some("asker"), "B", ts(1));
        removed.removed = true;
        assert_eq!(rules.judge(&removed, CommentParent::Comment(&parent), Some("asker")), Verdict::Skip);
    }

    #[test]
    fn test_judge_thread_rules() {
        let rules = rules();
        let parent = Comment::new("p", Some("u1"), "A", ts(0));

        let by_asker = Comment::new("c", Some("asker"), "B", ts(1));
        assert_eq!(
            rules.judge(&by_asker, CommentParent::Comment(&parent), Some("asker")),
            Verdict::RemoveThread(RemovalReason::AskerAnswering)
        );

        let chained = Comment::new("c", Some("u1"), "B", ts(1));
        assert_eq!(
            rules.judge(&chained, CommentParent::Comment(&parent), Some("asker")),
            Verdict::RemoveThread(RemovalReason::SelfChain)
        );

        let deleted_parent = Comment::new("p", None, "A", ts(0));
        let fine = Comment::new("c", Some("u1"), "B", ts(1));
        assert_eq!(
            rules.judge(&fine, CommentParent::Comment(&deleted_parent), Some("asker")),
            Verdict::Accept(CommentKind::Letter("B".to_string()))
        );
    }

    #[test]
    fn test_judge_noise() {
        let rules = rules();
        let parent = Comment::new("p", Some("u1"), "A", ts(0));
        let noise = Comment::new("c", Some("u2"), "hello there", ts(1));
        assert_eq!(
            rules.judge(&noise, CommentParent::Comment(&parent), Some("asker")),
            Verdict::Remove(RemovalReason::Noise)
        );
        assert!(!RemovalReason::Noise.removes_thread());
        assert!(RemovalReason::SelfChain.removes_thread());
    }

    #[test]
    fn test_duplicate_letter_keeps_branch_with_replies() {
        let existing = Comment::new("a", Some("u1"), "A", ts(0)).with_reply(Comment::new("x", Some("u2"), "B", ts(1)));
        let later_leaf = Comment::new("b", Some("u3"), "A", ts(5)).with_score(50);
        assert_eq!(resolve_duplicate_letter(&existing, &later_leaf), DuplicateResolution::RemoveIncoming);

        let older_leaf = Comment::new("c", Some("u3"), "A", ts(-5)).with_score(50);
        assert_eq!(resolve_duplicate_letter(&existing, &older_leaf), DuplicateResolution::RemoveIncoming);
    }

    #[test]
    fn test_duplicate_letter_between_leaves() {
        let existing = Comment::new("a", Some("u1"), "A", ts(0));
        let newer = Comment::new("b", Some("u2"), "A", ts(5));
        let older = Comment::new("c", Some("u3"), "A", ts(-5));
        assert_eq!(resolve_duplicate_letter(&existing, &newer), DuplicateResolution::RemoveIncoming);
        assert_eq!(resolve_duplicate_letter(&existing, &older), DuplicateResolution::ReplaceExisting);

        let with_replies = Comment::new("d", Some("u4"), "A", ts(9)).with_reply(Comment::new("x", Some("u2"), "B", ts(10)));
        assert_eq!(resolve_duplicate_letter(&existing, &with_replies), DuplicateResolution::ReplaceExisting);
    }

    #[test]
    fn test_duplicate_stop_word_order() {
        let existing = Comment::new("a", Some("u1"), "Goodbye", ts(0)).with_score(5);
        let lower = Comment::new("b", Some("u2"), "Goodbye", ts(-5)).with_score(4);
        let higher = Comment::new("c", Some("u2"), "Goodbye", ts(5)).with_score(6);
        let tied_later = Comment::new("d", Some("u2"), "Goodbye", ts(5)).with_score(5);
        let tied_earlier = Comment::new("e", Some("u2"), "Goodbye", ts(-5)).with_score(5);

        assert_eq!(resolve_duplicate_stop_word(&existing, &lower), DuplicateResolution::RemoveIncoming);
        assert_eq!(resolve_duplicate_stop_word(&existing, &higher), DuplicateResolution::ReplaceExisting);
        assert_eq!(resolve_duplicate_stop_word(&existing, &tied_later), DuplicateResolution::RemoveIncoming);
        assert_eq!(resolve_duplicate_stop_word(&existing, &tied_earlier), DuplicateResolution::ReplaceExisting);
    }
}
