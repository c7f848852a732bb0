use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autopost::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "autopost",
    version,
    about = "Bulk content publishing with quota-aware generation and browser automation",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file; environment variables override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish posts until every account reaches today's goal
    Run {
        /// Simulate publishing without a browser; nothing is persisted
        #[arg(long, default_value = "false")]
        dry_run: bool,

        /// Per-account goal overriding the stored setting
        #[arg(short, long)]
        goal: Option<u32>,
    },

    /// Create the store and today's progress rows
    Init {
        /// Text file with one keyword per line
        #[arg(short, long)]
        keywords: Option<PathBuf>,

        /// JSON file with an array of accounts
        #[arg(short, long)]
        accounts: Option<PathBuf>,

        /// Per-account daily goal to store
        #[arg(short, long)]
        goal: Option<u32>,
    },

    /// Show today's progress per account
    Progress,

    /// Show today's credential usage
    Usage,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = Config::load(cli.config.as_deref())?;

    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&format, &config.logging.level, cli.verbose)?;

    tracing::info!("autopost starting");

    match cli.command {
        Commands::Run { dry_run, goal } => {
            tracing::info!(dry_run = %dry_run, goal = ?goal, "Starting run command");
            commands::run(config, commands::RunParams { dry_run, goal }).await?;
        }

        Commands::Init {
            keywords,
            accounts,
            goal,
        } => {
            tracing::info!(
                keywords = ?keywords,
                accounts = ?accounts,
                goal = ?goal,
                "Starting init command"
            );
            commands::init(
                config,
                commands::InitParams {
                    keywords,
                    accounts,
                    goal,
                },
            )
            .await?;
        }

        Commands::Progress => commands::progress(config).await?,

        Commands::Usage => commands::usage(config).await?,
    }

    tracing::info!("autopost completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("autopost=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("autopost={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
