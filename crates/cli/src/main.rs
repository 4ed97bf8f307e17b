//! MediaClaw CLI, the main entry point.
//!
//! Commands:
//! - `serve`    - Start the HTTP gateway
//! - `chat`     - Interactive chat or single-message mode
//! - `onboard`  - Write a default config
//! - `doctor`   - Check config, model backend and media services
//! - `tools`    - List the tools the agent can call

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mediaclaw_config::LoggingConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "mediaclaw",
    about = "MediaClaw - chat with your Radarr, Sonarr and qBittorrent",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.mediaclaw/config.toml
    #[arg(long, global = true, env = "MEDIACLAW_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Session to continue
        #[arg(short, long, default_value = "cli")]
        session: String,
    },

    /// Write a default configuration file
    Onboard,

    /// Diagnose config and connectivity
    Doctor,

    /// List available tools
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref());
    let logging = config.as_ref().map(|c| c.logging.clone()).unwrap_or_default();
    init_tracing(&logging, cli.verbose);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config?, port).await?,
        Commands::Chat { message, session } => commands::chat::run(config?, message, session).await?,
        Commands::Onboard => commands::onboard::run(cli.config.as_deref())?,
        Commands::Doctor => commands::doctor::run(config).await?,
        Commands::Tools => commands::tools::run(config?)?,
    }

    Ok(())
}

/// `RUST_LOG` wins, then `--verbose`, then the configured level.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
