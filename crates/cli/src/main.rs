//! CRAB AI CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Start the web app
//! - `migrate`: Back up and upgrade an older database
//! - `ask`: Answer one query through the provider chain
//! - `providers`: Show the configured provider chain
//! - `onboard`: Write a default config

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "crabai",
    about = "CRAB AI: chat front end with provider fallback",
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
    /// Start the HTTP server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Back up the database and add the chat columns older versions lack
    Migrate {
        /// Database file (defaults to the configured one)
        #[arg(short, long, env = "CRABAI_DATABASE")]
        database: Option<std::path::PathBuf>,
    },

    /// Ask a single question (nothing is saved)
    Ask {
        /// The question
        query: String,

        /// Ask for a detailed explanation
        #[arg(short, long)]
        detailed: bool,
    },

    /// Show the provider chain in the order it is tried
    Providers,

    /// Create the config directory and a default config
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Migrate { database } => commands::migrate::run(database).await?,
        Commands::Ask { query, detailed } => commands::ask::run(query, detailed).await?,
        Commands::Providers => commands::providers::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
