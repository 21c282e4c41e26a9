use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;
use std::fmt;
use std::sync::Arc;

use crate::config::BotConfiguration;
use crate::platforms::DiscussionPlatform;

pub mod ack;
pub mod actions;
pub mod answer_builder;
pub mod moderation;
pub mod normalizer;
pub mod ouija;
pub mod rate_limiter;
pub mod reveal_document;
pub mod submission_gate;
pub mod wheel;

use ouija::OuijaGame;
use wheel::WheelGame;

/// One unit of work, run to completion by a scheduler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    OuijaCheck,
    OuijaClose,
    OuijaOpen,
    WheelCheck,
    WheelOpen,
    WheelWork,
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BotCommand::OuijaCheck => "ouija-check",
            BotCommand::OuijaClose => "ouija-close",
            BotCommand::OuijaOpen => "ouija-open",
            BotCommand::WheelCheck => "wheel-check",
            BotCommand::WheelOpen => "wheel-open",
            BotCommand::WheelWork => "wheel-work",
        };
        write!(f, "{}", name)
    }
}

/// Runs both games against one community.
pub struct GameBot {
    platform: Arc<dyn DiscussionPlatform>,
    config: BotConfiguration,
}

impl GameBot {
    pub fn new(platform: Arc<dyn DiscussionPlatform>, config: BotConfiguration) -> Self {
        Self { platform, config }
    }

    pub async fn ouija(&self) -> Result<OuijaGame> {
        let bot_name = self.platform.current_user().await?;
        OuijaGame::new(Arc::clone(&self.platform), self.config.ouija.clone(), bot_name)
    }

    pub async fn wheel(&self) -> Result<WheelGame> {
        let bot_name = self.platform.current_user().await?;
        Ok(WheelGame::new(Arc::clone(&self.platform), self.config.wheel.clone(), bot_name))
    }

    pub async fn run(&self, command: BotCommand, now: DateTime<Utc>) -> Result<()> {
        info!(
            "Running {} on r/{} via {}",
            command,
            self.config.core.subreddit,
            self.platform.platform_name()
        );

        match command {
            BotCommand::OuijaCheck => {
                self.ouija().await?.check(now).await?;
            }
            BotCommand::OuijaClose => {
                self.ouija().await?.close(now).await?;
            }
            BotCommand::OuijaOpen => {
                let notified = self.ouija().await?.open().await?;
                info!("Notified {} players", notified);
            }
            BotCommand::WheelCheck => {
                let found = self.wheel().await?.check(now).await?;
                info!("Live game found: {}", found);
            }
            BotCommand::WheelOpen => {
                self.wheel().await?.open().await?;
            }
            BotCommand::WheelWork => {
                self.wheel().await?.work(now).await?;
            }
        }
        Ok(())
    }
}
