//! Stellar Link Bot - chat commands for linked Stellar accounts
//!
//! # WARNING
//! - Transfers move real funds when the ledger mode is `horizon`.
//! - Keep `linkbot.toml` and `.env` out of version control; they hold SMTP
//!   credentials and relay endpoints.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

// Use the library crate
use stellar_link_bot::cli::commands;
use stellar_link_bot::config::Config;

/// Stellar Link Bot - account linking and OTP-gated transfers
#[derive(Parser)]
#[command(name = "linkbot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "linkbot.toml", env = "LINKBOT_CONFIG")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the bot from stdin (`<actor> <command>` per line)
    Console,

    /// Show current configuration (secrets masked)
    Config,

    /// Print the current TOTP code for a base32 secret
    Totp {
        /// Base32 secret as shown at enrollment
        secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json_logs)?;

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Console => commands::console(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Totp { secret } => commands::totp_code(&config, &secret),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize tracing
fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(
        "stellar_link_bot=info"
            .parse()
            .context("Invalid default log directive")?,
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.with_file(true).with_line_number(true).init();
    }
    Ok(())
}
