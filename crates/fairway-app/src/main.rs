// Fairway entry point.
//
// 1. Initialize tracing (log to file)
// 2. Parse the command line
// 3. Load config, copying defaults on first run
// 4. Open the database
// 5. Run the command

use clap::Parser;
use fairway_app::commands::{AppContext, Cli};
use fairway_app::config;
use fairway_core::db::Database;

use anyhow::Context;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: league={}, season {}, sync mode {}",
        config.league.name,
        config.league.season_year,
        config.feed.sync_mode.as_str()
    );

    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    let ctx = AppContext::new(config, db);
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = cli.command.run(&ctx, &mut stdout).await {
        error!("command failed: {e:#}");
        return Err(e);
    }
    Ok(())
}

/// Initialize tracing to log to a file so command output stays readable.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("fairway.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fairway=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
