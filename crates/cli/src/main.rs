//! Emberchat CLI, the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP API server
//! - `config`  Print the effective configuration
//! - `doctor`  Diagnose configuration, storage and model access

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use emberchat_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "emberchat",
    about = "Emberchat: fire and safety advisory chat backend",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ~/.emberchat/config.toml)
    #[arg(short, long, global = true, env = "EMBERCHAT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Print the effective configuration (secrets redacted)
    Config {
        /// Print the built-in defaults instead
        #[arg(long)]
        default: bool,
    },

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Serve { port, host } => {
            let config = load_config(cli.config.as_deref())?;
            commands::serve::run(config, port, host).await?
        }
        Commands::Config { default } => {
            if default {
                commands::config_cmd::print_default();
            } else {
                let config = load_config(cli.config.as_deref())?;
                commands::config_cmd::show(&config, &config_path(cli.config.as_deref()))?;
            }
        }
        Commands::Doctor => commands::doctor::run(cli.config.as_deref()).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// The file settings are read from: `--config` when given, else the default.
fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))
}
