//! pmok CLI

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pmok::config::{RecordCommand, RecorderConfig, Settings};
use pmok::project::{FsProjectStore, ProjectStore};
use pmok::{logging, server};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "pmok", version, about = "Record live HTTP traffic as JSON mocks")]
struct Cli {
    /// Override log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Proxy requests to a target and record JSON responses
    Record {
        /// Base URL of the service to record, e.g. https://api.example.com
        #[arg(short, long)]
        target: String,
        /// Subdirectory of the project's mock directory to write into
        #[arg(short, long)]
        path: Option<String>,
        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
        /// Optional settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Record {
            target,
            path,
            port,
            config,
        } => {
            let command = RecordCommand {
                target,
                responses_path: path,
            };
            record(&command, port, config, cli.log_level.as_deref()).await
        }
    }
}

async fn record(
    command: &RecordCommand,
    port: Option<u16>,
    settings_path: Option<PathBuf>,
    log_level: Option<&str>,
) -> anyhow::Result<()> {
    command.validate().context("invalid record command")?;

    let mut settings = match settings_path {
        Some(path) => Settings::from_file(&path)
            .with_context(|| format!("load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(port) = port {
        settings.listen.port = port;
    }

    logging::init(&settings.logging, log_level)?;

    let mock_root = FsProjectStore::from_current_dir()?
        .mock_root()
        .context("not inside a protomok project")?;
    let config = RecorderConfig::new(command, &mock_root, &settings)?;

    info!("Starting pmok v{}", env!("CARGO_PKG_VERSION"));
    server::run(config, shutdown_signal()).await.map_err(|e| {
        error!("Recorder failed: {}", e);
        e.into()
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
