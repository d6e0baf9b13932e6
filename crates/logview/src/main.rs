mod api;
mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use logview_logging::LogFormat;
use logview_sessions::SessionScanner;

use crate::config::{Overrides, ViewerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "logview",
    about = "Browse and live-tail session event logs",
    version,
    author
)]
struct Cli {
    /// Config file (default: <config_dir>/logview/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the project/session tree
    #[arg(short = 'd', long)]
    projects_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (the next ports are tried when busy)
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve every route under this prefix, e.g. /logs
    #[arg(long)]
    base_path: Option<String>,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormatChoice>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            projects_dir: self.projects_dir.clone(),
            host: self.host.clone(),
            port: self.port,
            base_path: self.base_path.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.map(Into::into),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ViewerConfig::load(cli.config.as_deref())?.merge(cli.overrides());
    logview_logging::init_tracing(&config.log_level, config.log_format)
        .map_err(anyhow::Error::msg)?;

    let projects_dir = config.projects_dir()?;
    if !projects_dir.exists() {
        tracing::warn!("Projects directory {:?} does not exist yet", projects_dir);
    }
    tracing::info!("Reading sessions from {:?}", projects_dir);

    let scanner = Arc::new(SessionScanner::with_dir(projects_dir).with_freshness(config.freshness()));
    let state = api::AppState::new(scanner, config.poll_interval());

    let base_path = api::normalize_base_path(config.base_path.as_deref().unwrap_or(""))
        .map_err(anyhow::Error::msg)
        .context("Invalid base_path")?;
    let router = api::create_router(state, Some(&base_path)).map_err(anyhow::Error::msg)?;

    let listener = server::bind(&config.host, config.port).await?;
    server::run(listener, router, &base_path).await
}
