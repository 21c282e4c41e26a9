use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use ouijabot::prelude::*;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Action {
    /// Walk unanswered ouija posts, moderate them and flair the answers
    OuijaCheck,
    /// Stop new questions and post the closing announcement
    OuijaClose,
    /// Accept new questions again and notify subscribed players
    OuijaOpen,
    /// Poll the live wheel game
    WheelCheck,
    /// Open a new wheel game for the current solution
    WheelOpen,
    /// Poll the live wheel game, or open one when the solution is new
    WheelWork,
}

impl From<Action> for BotCommand {
    fn from(action: Action) -> Self {
        match action {
            Action::OuijaCheck => BotCommand::OuijaCheck,
            Action::OuijaClose => BotCommand::OuijaClose,
            Action::OuijaOpen => BotCommand::OuijaOpen,
            Action::WheelCheck => BotCommand::WheelCheck,
            Action::WheelOpen => BotCommand::WheelOpen,
            Action::WheelWork => BotCommand::WheelWork,
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Moderation bot for the ouija and wheel games")]
struct Cli {
    /// Directory holding bot.yaml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Increase output verbosity
    #[arg(short, long)]
    verbose: bool,

    #[arg(value_enum, default_value_t = Action::WheelWork)]
    action: Action,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose, then core.log_level once the
    // configuration is loaded.
    let from_env = std::env::var("RUST_LOG").is_ok();
    let mut builder = env_logger::Builder::from_default_env();
    if !from_env {
        builder.filter_level(log::LevelFilter::Trace);
    }
    builder.init();
    if !from_env {
        log::set_max_level(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info });
    }

    info!("Starting ouijabot v{}", ouijabot::VERSION);

    let config = ConfigurationManager::new(&cli.config_dir).load().await?;
    if !from_env && !cli.verbose {
        match config.core.log_level.parse::<log::LevelFilter>() {
            Ok(level) => log::set_max_level(level),
            Err(_) => warn!("Unknown log level {:?}, keeping info", config.core.log_level),
        }
    }
    let reddit_config = RedditConfig::from_env(&config.core.subreddit, &config.core.user_agent)?;
    let platform = Arc::new(RedditConnection::new(reddit_config)?);

    let bot = GameBot::new(platform, config);
    let command = BotCommand::from(cli.action);
    if let Err(e) = bot.run(command, chrono::Utc::now()).await {
        error!("{} failed: {:#}", command, e);
        return Err(e);
    }

    info!("{} done", command);
    Ok(())
}
