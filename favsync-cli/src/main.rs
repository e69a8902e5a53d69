mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use favsync_core::{FavoritesManager, SyncConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "favsync", version, about = "Inspect and edit synchronized product favorites")]
struct Cli {
    /// Favorites API base URL (overrides config and FAVSYNC_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token for the favorites API
    #[arg(long, global = true)]
    token: Option<String>,

    /// Directory holding the local favorites snapshot
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every favorited id
    List,
    /// Report whether each id is a favorite
    Check { ids: Vec<String> },
    /// Flip the favorite flag of each id
    Toggle {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Re-fetch favorites from the server
    Refresh,
    /// Dump the manager's internal state as JSON
    Inspect,
    /// Drop local state and reload, e.g. after switching accounts
    Reset {
        /// Reload as this user instead of the configured one
        #[arg(long)]
        login_token: Option<String>,
        /// Reload signed out
        #[arg(long, conflicts_with = "login_token")]
        logout: bool,
    },
    /// Poll the server and print changes for the given ids
    Watch {
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show the effective configuration
    Config {
        /// Also write it to the user config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = SyncConfig::load();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    if let Some(token) = cli.token {
        config.auth_token = Some(token);
    }
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = Some(dir);
    }

    if let Command::Config { write } = cli.command {
        return commands::show_config(&config, write);
    }

    let manager = FavoritesManager::from_config(&config).context("failed to set up favorites manager")?;
    match cli.command {
        Command::List => commands::list(&manager).await,
        Command::Check { ids } => commands::check(&manager, &ids).await,
        Command::Toggle { ids } => commands::toggle(&manager, &ids).await,
        Command::Refresh => commands::refresh(&manager).await,
        Command::Inspect => commands::inspect(&manager).await,
        Command::Reset { login_token, logout } => {
            let identity = match (login_token, logout) {
                (Some(token), _) => Some(Some(token)),
                (None, true) => Some(None),
                (None, false) => None,
            };
            commands::reset(&manager, identity).await
        }
        Command::Watch { interval_secs, ids } => commands::watch(&manager, interval_secs, &ids).await,
        Command::Config { .. } => Ok(()),
    }
}

// used when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str = "info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
