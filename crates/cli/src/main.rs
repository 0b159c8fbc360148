//! Aria CLI: the main entry point.
//!
//! Commands:
//! - `onboard`     : Write the default config and data directory
//! - `run`         : Single task or interactive REPL
//! - `providers`   : Show configured providers
//! - `alternatives`: Free alternatives to a paid service
//! - `logs`        : Recent execution logs
//! - `status`      : Configuration summary

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "aria",
    about = "Aria, an autonomous task agent with multi-provider failover",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and data directory
    Onboard,

    /// Run a task, or start an interactive session
    Run {
        /// Run a single task instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show configured providers, priorities and key presence
    Providers,

    /// Suggest free alternatives to a paid service
    Alternatives {
        /// Service name, e.g. "openai" or "pinecone"
        service: String,
    },

    /// Show recent execution logs
    Logs {
        /// Number of logs to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show configuration summary
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Run { message } => commands::run::run(message).await?,
        Commands::Providers => commands::providers::run().await?,
        Commands::Alternatives { service } => commands::alternatives::run(&service).await?,
        Commands::Logs { limit } => commands::logs::run(limit).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
