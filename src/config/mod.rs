// src/config/mod.rs - YAML configuration for both games

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::types::FlairSpec;

pub const CONFIG_FILE: &str = "bot.yaml";

/// Complete bot configuration, read once per run and then treated as immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfiguration {
    pub version: String,
    pub description: String,
    pub core: CoreBotSettings,
    pub ouija: OuijaConfig,
    pub wheel: WheelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreBotSettings {
    pub subreddit: String,
    pub user_agent: String,
    pub log_level: String,
}

/// Tree-spelling game settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OuijaConfig {
    /// Case-insensitive prefixes that terminate an answer chain.
    pub stop_words: Vec<String>,
    pub score_floor: ScoreFloorConfig,
    pub new_posts_limit: usize,
    pub flair_max_length: usize,
    pub unanswered_flair: FlairSpec,
    /// `text` is used as the prefix in front of the composed answer.
    pub answered_flair: FlairSpec,
    pub mod_post_flair: FlairSpec,
    pub notification: NotificationTemplate,
    pub removal_messages: RemovalMessages,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Minimum score an accepted stop word needs.
///
/// The bar starts at `minimum + young_bonus` for a brand new post and drops
/// linearly by `young_bonus` every `ramp_hours`; an answer is rejected only
/// when its score is below both `minimum` and that sliding bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreFloorConfig {
    pub enabled: bool,
    pub minimum: i64,
    pub young_bonus: i64,
    pub ramp_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub subject: String,
    /// Supports `$(question)`, `$(answer)` and `$(permalink)`.
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalMessages {
    pub asker_answering: String,
    pub self_chain: String,
}

/// Closing and reopening the community to new questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Wiki page holding the automoderator rules.
    pub automod_page: String,
    /// Text found on the line after the `name:` condition of the rule that
    /// lets questions through.
    pub automod_marker: String,
    /// Hours from closing to the next opening, used in the closing title.
    pub reopen_after_hours: i64,
    /// `chrono` format of the reopening date.
    pub date_format: String,
    pub closing_title_prefix: String,
    pub closing_body: String,
    /// Heading of the list of questions still open at closing time.
    pub open_questions_header: String,
    /// Sticky comment under the closing post; replies to it are notified
    /// at the next opening.
    pub subscription_comment: String,
    pub opening_reply: String,
}

/// Flat reveal game settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelConfig {
    /// Letters a player may guess; anything else is rejected.
    pub alphabet: String,
    pub placeholder: char,
    pub letters: RateWindowConfig,
    pub phrases: RateWindowConfig,
    /// A quiet post grants a capped player one extra attempt.
    pub inactivity_grace_minutes: i64,
    pub solution_page: String,
    pub solution_max_age_hours: i64,
    pub new_posts_limit: usize,
    pub in_progress_flair: FlairSpec,
    pub solved_flair: FlairSpec,
    pub title_prefix: String,
    pub intro: String,
    pub missing_label: String,
    pub solved_label: String,
    pub rules: String,
    pub messages: WheelMessages,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateWindowConfig {
    pub max_attempts: u32,
    pub window_hours: i64,
}

/// Reply templates. `$(user)` and `$(body)` are substituted; every template
/// that counts toward a rate window must contain `u/$(user)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelMessages {
    pub letter_limit: String,
    pub letter_invalid: String,
    pub letter_present: String,
    pub letter_absent: String,
    pub phrase_limit: String,
    /// Also supports `$(revealed)`, the number of letters uncovered so far.
    pub phrase_correct: String,
    pub phrase_incorrect: String,
}

impl Default for BotConfiguration {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            description: "Ouija and wheel game moderation".to_string(),
            core: CoreBotSettings {
                subreddit: "DimmiOuija".to_string(),
                user_agent: format!("rust:ouijabot:{}", env!("CARGO_PKG_VERSION")),
                log_level: "info".to_string(),
            },
            ouija: OuijaConfig::default(),
            wheel: WheelConfig::default(),
        }
    }
}

impl Default for OuijaConfig {
    fn default() -> Self {
        Self {
            stop_words: vec!["Goodbye".to_string(), "Arrivederci".to_string(), "Addio".to_string()],
            score_floor: ScoreFloorConfig {
                enabled: true,
                minimum: 3,
                young_bonus: 2,
                ramp_hours: 8.0,
            },
            new_posts_limit: 100,
            flair_max_length: 64,
            unanswered_flair: FlairSpec {
                text: "Unanswered".to_string(),
                css_class: "unanswered".to_string(),
                template_id: None,
            },
            answered_flair: FlairSpec {
                text: "Ouija says: ".to_string(),
                css_class: "answered".to_string(),
                template_id: None,
            },
            mod_post_flair: FlairSpec {
                text: "Ouija".to_string(),
                css_class: "modpost".to_string(),
                template_id: None,
            },
            notification: NotificationTemplate {
                subject: "THE SPIRITS HAVE SPOKEN".to_string(),
                body: "You asked:  \n> $(question)\n\nThe spirits say:  \n> $(answer)\n\n[Comment here]($(permalink)?context=100)".to_string(),
            },
            removal_messages: RemovalMessages {
                asker_answering: "The author of the question cannot write the answer.".to_string(),
                self_chain: "You cannot reply to your own letter.".to_string(),
            },
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            automod_page: "config/automoderator".to_string(),
            automod_marker: "DummyUtente9510".to_string(),
            reopen_after_hours: 24 * 13 + 12,
            date_format: "%-d %B".to_string(),
            closing_title_prefix: "We reopen on ".to_string(),
            closing_body: "Comment on the results of this round here.\n\nUntil then no new questions can be asked, only the open ones can be finished.".to_string(),
            open_questions_header: "The questions still open are:".to_string(),
            subscription_comment: "Want to be told when we reopen next time?  \nReply to THIS comment.".to_string(),
            opening_reply: "Hi,  \nthe spirits are back.\n\nSee you there.".to_string(),
        }
    }
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            alphabet: "ABCDEFGHIJKLMNOPQRSTUVWXYZÀÈÉÌÒÙ".to_string(),
            placeholder: '–',
            letters: RateWindowConfig { max_attempts: 1, window_hours: 1 },
            phrases: RateWindowConfig { max_attempts: 2, window_hours: 2 },
            inactivity_grace_minutes: 30,
            solution_page: "rdellaf".to_string(),
            solution_max_age_hours: 24,
            new_posts_limit: 100,
            in_progress_flair: FlairSpec {
                text: "Wheel of fortune".to_string(),
                css_class: "unanswered".to_string(),
                template_id: None,
            },
            solved_flair: FlairSpec {
                text: "Solved!".to_string(),
                css_class: "answered".to_string(),
                template_id: None,
            },
            title_prefix: "Wheel of fortune".to_string(),
            intro: "Guess the phrase:".to_string(),
            missing_label: "Letters not in the phrase".to_string(),
            solved_label: "Guessed by".to_string(),
            rules: "---\n\nComment with a single letter to reveal it, or with a whole phrase to try and win.\n\nEvery player may try ONE letter per hour and TWO phrases every TWO hours.".to_string(),
            messages: WheelMessages {
                letter_limit: "Hi,  \nyou have to wait longer before asking for another letter.".to_string(),
                letter_invalid: "The letter \"`$(body)`\" is not a valid one.".to_string(),
                letter_present: "Hi u/$(user),  \nthe letter \"`$(body)`\" is in the phrase.".to_string(),
                letter_absent: "Hi u/$(user),  \nthe letter \"`$(body)`\" is NOT in the phrase.".to_string(),
                phrase_limit: "Hi,  \nyou have to wait longer before trying another phrase.".to_string(),
                phrase_correct: "Great job u/$(user),  \nyou guessed the phrase: `$(body)`\n\n$(revealed) letters had been revealed.".to_string(),
                phrase_incorrect: "Hi u/$(user),  \nunfortunately your comment is not the phrase.\n\n> $(body)".to_string(),
            },
        }
    }
}

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, config: &BotConfiguration) -> Result<()> {
        if config.core.subreddit.trim().is_empty() {
            return Err(anyhow::anyhow!("core.subreddit cannot be empty"));
        }
        self.validate_ouija(&config.ouija)?;
        self.validate_wheel(&config.wheel)
    }

    fn validate_ouija(&self, config: &OuijaConfig) -> Result<()> {
        if config.stop_words.iter().all(|w| w.trim().is_empty()) {
            return Err(anyhow::anyhow!("ouija.stop_words needs at least one word"));
        }
        if config.flair_max_length < 4 {
            return Err(anyhow::anyhow!("ouija.flair_max_length is too short"));
        }
        if config.score_floor.ramp_hours <= 0.0 {
            return Err(anyhow::anyhow!("ouija.score_floor.ramp_hours must be positive"));
        }
        if config.schedule.automod_marker.trim().is_empty() {
            return Err(anyhow::anyhow!("ouija.schedule.automod_marker cannot be empty"));
        }
        if config.schedule.reopen_after_hours <= 0 {
            return Err(anyhow::anyhow!("ouija.schedule.reopen_after_hours must be positive"));
        }
        if StrftimeItems::new(&config.schedule.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(anyhow::anyhow!("ouija.schedule.date_format is not a valid date format"));
        }
        Ok(())
    }

    fn validate_wheel(&self, config: &WheelConfig) -> Result<()> {
        if config.alphabet.is_empty() {
            return Err(anyhow::anyhow!("wheel.alphabet cannot be empty"));
        }
        if config.alphabet.contains(config.placeholder) {
            return Err(anyhow::anyhow!("wheel.placeholder cannot be a guessable letter"));
        }
        for (name, window) in [("letters", config.letters), ("phrases", config.phrases)] {
            if window.max_attempts == 0 || window.window_hours <= 0 {
                return Err(anyhow::anyhow!("wheel.{} rate window must be positive", name));
            }
        }
        if config.missing_label.contains(':') || config.solved_label.contains(':') {
            return Err(anyhow::anyhow!("wheel labels cannot contain ':'"));
        }
        for (name, template) in [
            ("letter_present", &config.messages.letter_present),
            ("letter_absent", &config.messages.letter_absent),
            ("phrase_correct", &config.messages.phrase_correct),
            ("phrase_incorrect", &config.messages.phrase_incorrect),
        ] {
            if !template.contains("u/$(user)") {
                return Err(anyhow::anyhow!("wheel.messages.{} must mention u/$(user)", name));
            }
        }
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads `bot.yaml` from the configuration directory, writing the defaults
/// the first time the bot runs.
pub struct ConfigurationManager {
    config_dir: PathBuf,
    validator: ConfigValidator,
}

impl ConfigurationManager {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
            validator: ConfigValidator::new(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub async fn load(&self) -> Result<BotConfiguration> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir)
                .await
                .with_context(|| format!("creating {}", self.config_dir.display()))?;
            info!("Created configuration directory: {}", self.config_dir.display());
        }

        let config_path = self.config_path();
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: BotConfiguration = serde_yaml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            debug!("Loaded configuration from {}", config_path.display());
            config
        } else {
            warn!("{} not found, writing defaults", config_path.display());
            let config = BotConfiguration::default();
            self.save(&config).await?;
            config
        };

        self.validator.validate(&config)?;
        Ok(config)
    }

    pub async fn save(&self, config: &BotConfiguration) -> Result<()> {
        let content = serde_yaml::to_string(config)?;
        fs::write(self.config_path(), content)
            .await
            .with_context(|| format!("writing {}", self.config_path().display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigurationManager::new(temp_dir.path().join("config"));

        let config = manager.load().await.unwrap();
        assert!(manager.config_path().exists());
        assert_eq!(config.wheel.letters.max_attempts, 1);
        assert_eq!(config.wheel.phrases.window_hours, 2);
    }

    #[tokio::test]
    async fn test_load_reads_saved_overrides() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigurationManager::new(temp_dir.path());

        let mut config = BotConfiguration::default();
        config.core.subreddit = "TestOuija".to_string();
        config.wheel.letters.max_attempts = 3;
        manager.save(&config).await.unwrap();

        let loaded = manager.load().await.unwrap();
        assert_eq!(loaded.core.subreddit, "TestOuija");
        assert_eq!(loaded.wheel.letters.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() {
        let temp_dir = tempdir().unwrap();
        let manager = ConfigurationManager::new(temp_dir.path());

        let mut config = BotConfiguration::default();
        config.wheel.letters.max_attempts = 0;
        manager.save(&config).await.unwrap();

        assert!(manager.load().await.is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(ConfigValidator::new().validate(&BotConfiguration::default()).is_ok());
    }

    #[test]
    fn test_counted_templates_need_attribution() {
        let mut config = BotConfiguration::default();
        config.wheel.messages.letter_present = "The letter is there.".to_string();
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_schedule_section_is_optional() {
        let mut value = serde_yaml::to_value(BotConfiguration::default()).unwrap();
        value["ouija"].as_mapping_mut().unwrap().remove("schedule");
        let config: BotConfiguration = serde_yaml::from_value(value).unwrap();
        assert_eq!(config.ouija.schedule.automod_page, "config/automoderator");
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_bad_date_format_is_rejected() {
        let mut config = BotConfiguration::default();
        config.ouija.schedule.date_format = "%Q".to_string();
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_placeholder_outside_alphabet() {
        let mut config = BotConfiguration::default();
        config.wheel.placeholder = 'A';
        assert!(ConfigValidator::new().validate(&config).is_err());
    }
}
