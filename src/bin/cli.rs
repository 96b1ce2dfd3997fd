//! group-spy CLI
//!
//! Local execution entry point: polls groups or doulists until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use group_spy::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, Crawler, PageWindow, PollTargets},
    services::KeywordMatcher,
    storage::{PostStore, SqliteStore},
};
use tokio_util::sync::CancellationToken;

/// group-spy - keyword watcher for community groups and doulists
#[derive(Parser, Debug)]
#[command(
    name = "group-spy",
    version,
    about = "Polls group and doulist pages for posts matching keywords",
    after_help = "example: group-spy group -g 10086 -g 12345 -k xx花园 -k xx地铁 -e 求租"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll groups for posts matching keywords
    Group {
        /// Group id (repeatable)
        #[arg(short, long = "groups", required = true)]
        groups: Vec<String>,

        /// Search keyword (repeatable)
        #[arg(short, long = "keywords")]
        keywords: Vec<String>,

        /// Excluded term (repeatable)
        #[arg(short, long = "exclude")]
        exclude: Vec<String>,

        /// Listing pages per pass (default: poll.pages)
        #[arg(long)]
        pages: Option<u32>,

        /// Start offset of the first page (default: poll.offset)
        #[arg(long)]
        offset: Option<u32>,

        /// Seconds between passes (default: poll.interval_secs)
        #[arg(long)]
        sleep: Option<u64>,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Poll doulists and store every entry
    Doulist {
        /// Doulist id (repeatable)
        #[arg(short, long = "doulists", required = true)]
        doulists: Vec<String>,

        /// Seconds between passes (default: poll.interval_secs)
        #[arg(long)]
        sleep: Option<u64>,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Mark a stored group post as collected
    Collect {
        /// Post id
        post_id: i64,

        /// Free-text note
        #[arg(long)]
        note: Option<String>,

        /// Clear the collected flag instead
        #[arg(long)]
        undo: bool,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `token` on Ctrl-C.
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Interrupt received, stopping after the current request...");
                token.cancel();
            }
            Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

async fn poll(
    config: &Config,
    store: &SqliteStore,
    targets: PollTargets,
    sleep: Option<u64>,
    once: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let crawler = Crawler::new(config, store, cancel)?;
    if once {
        pipeline::run_pass(&crawler, &targets).await;
        return Ok(());
    }

    let interval = Duration::from_secs(sleep.unwrap_or(config.poll.interval_secs));
    pipeline::run_poll(&crawler, &targets, interval).await
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
            return Ok(());
        }

        Command::Group {
            groups,
            keywords,
            exclude,
            pages,
            offset,
            sleep,
            once,
        } => {
            config.validate()?;
            if keywords.is_empty() {
                log::warn!("No keywords given; only already stored posts will be revised");
            }
            let targets = PollTargets::Groups {
                ids: groups,
                matcher: KeywordMatcher::new(&keywords, &exclude)?,
                window: PageWindow {
                    pages: pages.unwrap_or(config.poll.pages),
                    offset: offset.unwrap_or(config.poll.offset),
                },
            };
            let store = SqliteStore::open(&config.storage.database_path).await?;
            poll(&config, &store, targets, sleep, once).await?;
        }

        Command::Doulist {
            doulists,
            sleep,
            once,
        } => {
            config.validate()?;
            let targets = PollTargets::Doulists { ids: doulists };
            let store = SqliteStore::open(&config.storage.database_path).await?;
            poll(&config, &store, targets, sleep, once).await?;
        }

        Command::Collect {
            post_id,
            note,
            undo,
        } => {
            let store = SqliteStore::open(&config.storage.database_path).await?;
            if !store.set_collected(post_id, !undo, note.as_deref()).await? {
                return Err(AppError::validation(format!(
                    "group post {post_id} not found"
                )));
            }
            log::info!(
                "Post {} {}",
                post_id,
                if undo { "uncollected" } else { "collected" }
            );
        }
    }

    Ok(())
}
