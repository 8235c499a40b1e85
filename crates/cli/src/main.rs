//! Vellum CLI - vellum command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;

mod cmd;
mod locks;
mod util;
mod vault;

/// Vellum - Local-first markdown notes with a live vault index
#[derive(Parser)]
#[command(name = "vellum")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a vault in the current directory
    Init {
        /// Directory to initialize (default: current directory)
        path: Option<PathBuf>,
    },
    /// Create a note with identity frontmatter
    New {
        /// Note title
        title: String,

        /// Vault-relative folder to place the note in
        #[arg(long)]
        folder: Option<String>,
    },
    /// Show vault and watcher status
    Status,
    /// Reconcile the index against the files on disk
    Sync,
    /// Watch the vault and keep the index live until ctrl-c
    Watch,
    /// View and edit vault configuration
    Config {
        /// List every key with its current value (the default)
        #[arg(long)]
        list: bool,

        /// Print a single value
        #[arg(long, value_name = "KEY")]
        get: Option<String>,

        /// Change a value
        #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"])]
        set: Option<Vec<String>>,

        /// Print the config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `watch` tees its logs into the vault's log directory as well as stderr
    let _log_guard = init_tracing(matches!(cli.command, Commands::Watch))?;

    match cli.command {
        Commands::Init { path } => cmd::init::run(path).await,
        Commands::New { title, folder } => cmd::new::run(&title, folder.as_deref()).await,
        Commands::Status => cmd::status::run().await,
        Commands::Sync => cmd::sync::run().await,
        Commands::Watch => cmd::watch::run().await,
        Commands::Config { list, get, set, path } => cmd::config::run(list, get, set, path).await,
    }
}

fn init_tracing(tee_to_vault: bool) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if tee_to_vault {
        if let Ok(root) = util::find_vault_root() {
            let log_dir = root.join(vellum_core::VAULT_DIR).join("logs");
            std::fs::create_dir_all(&log_dir)?;
            let appender = tracing_appender::rolling::never(&log_dir, "watch.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            return Ok(Some(guard));
        }
    }

    tracing_subscriber::registry().with(filter).with(stderr_layer).init();
    Ok(None)
}
