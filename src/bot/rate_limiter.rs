// src/bot/rate_limiter.rs - Per-player attempt windows rebuilt from bot replies

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;

use crate::config::{RateWindowConfig, WheelConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptKind {
    Letter,
    Phrase,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub letters: RateWindowConfig,
    pub phrases: RateWindowConfig,
    pub inactivity_grace: Duration,
}

impl RateLimitPolicy {
    pub fn from_config(config: &WheelConfig) -> Self {
        Self {
            letters: config.letters,
            phrases: config.phrases,
            inactivity_grace: Duration::minutes(config.inactivity_grace_minutes),
        }
    }

    fn window(&self, kind: AttemptKind) -> RateWindowConfig {
        match kind {
            AttemptKind::Letter => self.letters,
            AttemptKind::Phrase => self.phrases,
        }
    }
}

/// Attempts counted for one player and one kind since `window_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// The player was at the cap but the post had gone quiet.
    AllowedByGrace,
    Limited,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateDecision::Limited)
    }
}

/// Sliding windows for one poll.
///
/// Nothing is stored between polls: the counters start empty and are filled
/// by folding every acknowledgment found on the post, then advanced as new
/// attempts are accepted. An accepted attempt is activity on the post, so
/// it ends the quiet period for the rest of the poll just as its reply
/// would for the next one.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    now: DateTime<Utc>,
    counts: HashMap<(String, AttemptKind), u32>,
    last_activity: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, now: DateTime<Utc>) -> Self {
        Self {
            policy,
            now,
            counts: HashMap::new(),
            last_activity: None,
        }
    }

    pub fn window_start(&self, kind: AttemptKind) -> DateTime<Utc> {
        self.now - Duration::hours(self.policy.window(kind).window_hours)
    }

    /// Fold one prior acknowledgment into the counters.
    pub fn record_ack(&mut self, username: Option<&str>, kind: AttemptKind, acked_at: DateTime<Utc>) {
        self.last_activity = Some(self.last_activity.map_or(acked_at, |t| t.max(acked_at)));
        let Some(username) = username else {
            return;
        };
        if acked_at >= self.window_start(kind) {
            *self.counts.entry((username.to_string(), kind)).or_insert(0) += 1;
        }
    }

    pub fn window(&self, username: &str, kind: AttemptKind) -> RateWindow {
        RateWindow {
            count: self.counts.get(&(username.to_string(), kind)).copied().unwrap_or(0),
            window_start: self.window_start(kind),
        }
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    pub fn is_quiet(&self) -> bool {
        match self.last_activity {
            Some(at) => self.now - at > self.policy.inactivity_grace,
            None => true,
        }
    }

    /// Whether the player may attempt now, without counting anything.
    pub fn check(&self, username: &str, kind: AttemptKind) -> RateDecision {
        let max = self.policy.window(kind).max_attempts;
        let count = self.window(username, kind).count;

        let decision = if count < max {
            RateDecision::Allowed
        } else if count == max && self.is_quiet() {
            RateDecision::AllowedByGrace
        } else {
            RateDecision::Limited
        };
        debug!("{} {:?} attempt {} of {}: {:?}", username, kind, count + 1, max, decision);
        decision
    }

    pub fn record_attempt(&mut self, username: &str, kind: AttemptKind) {
        *self.counts.entry((username.to_string(), kind)).or_insert(0) += 1;
        self.last_activity = Some(self.now);
    }
}
