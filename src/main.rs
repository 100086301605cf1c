use anyhow::Context;
use clap::Parser;
use quizcast::channels::telegram::{TelegramChannel, TelegramConfig};
use quizcast::config::Config;
use quizcast::engine::Engine;
use quizcast::logging::{self, LogFormat};
use quizcast::scheduler;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Scheduled quiz polls for Telegram groups
#[derive(Debug, Parser)]
#[command(name = "quizcast", version)]
struct Cli {
    /// Directory holding the score ledger (overrides DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let mut config = Config::from_env().context("incomplete configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    config.validate().context("invalid configuration")?;

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .context("failed to create data directory")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("QUIZCAST_GIT_HASH"),
        built = env!("QUIZCAST_BUILD_DATE"),
        quiz_group = config.quiz_group_id,
        storage_group = config.storage_group_id,
        "Starting quizcast"
    );

    let telegram = Arc::new(TelegramChannel::new(TelegramConfig {
        bot_token: config.bot_token.clone(),
        admin_id: config.admin_id,
    }));

    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config, telegram.clone(), jobs_tx);
    let worker = scheduler::spawn(engine.clone(), jobs_rx);

    tokio::select! {
        _ = telegram.run_update_loop(engine) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    worker.abort();
    Ok(())
}
