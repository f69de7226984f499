//! Pathwise CLI: the main entry point.
//!
//! Commands:
//! - `ask`     Answer one question, or chat interactively
//! - `list`    List every school or college program
//! - `warm`    Pre-populate the cache with common queries and listings
//! - `config`  Validate, show or print the default configuration

use clap::{Parser, Subcommand};
use pathwise_agent::{ListingKind, WarmKind};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "pathwise",
    about = "Pathwise: education and career pathway answers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "PATHWISE_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask about programs, pathways and careers
    Ask {
        /// The question; omit for interactive mode
        message: Option<String>,

        /// JSON profile file (education_level, interests, career_goals, location)
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Use the rule-based services even when an API key is set
        #[arg(long)]
        offline: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every program of one tier
    List {
        /// school or college
        #[arg(default_value = "college")]
        kind: ListingKind,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Warm the cache
    Warm {
        /// queries, listings or all
        #[arg(default_value = "all")]
        target: WarmKind,

        #[arg(long)]
        offline: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check the config file and environment
    Validate,
    /// Print the effective configuration
    Show,
    /// Print the default configuration
    Defaults,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Ask {
            message,
            profile,
            offline,
            json,
        } => {
            commands::ask::run(commands::ask::AskOptions {
                message,
                profile,
                offline,
                json,
            })
            .await?
        }
        Commands::List { kind, json } => commands::list::run(kind, json).await?,
        Commands::Warm { target, offline } => commands::warm::run(target, offline).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Defaults => commands::config_cmd::defaults().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
