use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};

use super::commands::Commands;
use super::env::CliArgs;
use super::runtime::init_logging;
use super::{cmd_annotate, cmd_extract, cmd_stdio};
use crate::config::{load_config, LoadedConfig};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    // Logging settings may come from the config file, so it is read first.
    let LoadedConfig { config, path } = load_config(cli.config.as_deref()).await?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_logging(&level, cli.debug, cli.log_json || config.logging.json)?;

    info!("Starting page-annotator v{}", env!("CARGO_PKG_VERSION"));
    match &path {
        Some(path) => debug!(path = %path.display(), "using config file"),
        None => debug!("using default config"),
    }

    let policy = config.policy;
    let result = match cli.command {
        Commands::Extract(args) => cmd_extract(args, policy).await,
        Commands::Annotate(args) => cmd_annotate(args, policy).await,
        Commands::Stdio(args) => cmd_stdio(args, policy).await,
    };

    if cli.metrics {
        let snapshot = page_annotations::metrics::snapshot();
        let rendered =
            serde_json::to_string_pretty(&snapshot).context("Failed to render metrics")?;
        eprintln!("{rendered}");
    }

    match result {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
