//! # Ouija Bot
//!
//! Moderation and game engine for two word-guessing games played in the
//! comments of a Reddit community.
//!
//! ## Games
//!
//! - **Ouija**: the answer to a question is spelled one letter per reply,
//!   each reply nested under the previous letter, and closed by a stop word
//!   such as "Goodbye". The best-voted complete chain becomes the post flair.
//! - **Wheel**: players guess single letters or the whole hidden phrase; the
//!   partially revealed phrase lives in the post body between runs.
//!
//! Every run is a batch poll. Nothing is kept locally between runs: the
//! bot's own replies mark what was already handled.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ouijabot::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigurationManager::new("config").load().await?;
//!     let reddit = RedditConfig::from_env(&config.core.subreddit, &config.core.user_agent)?;
//!     let platform = Arc::new(RedditConnection::new(reddit)?);
//!
//!     let bot = GameBot::new(platform, config);
//!     bot.run(BotCommand::WheelWork, chrono::Utc::now()).await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod platforms;
pub mod types;

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::{BotCommand, GameBot};
    pub use crate::config::{BotConfiguration, ConfigurationManager};
    pub use crate::platforms::{
        memory::InMemoryPlatform,
        reddit::{RedditConfig, RedditConnection},
        DiscussionPlatform,
    };
    pub use crate::types::{Comment, GameError, Post};
    pub use anyhow::Result;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
