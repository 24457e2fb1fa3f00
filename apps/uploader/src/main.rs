//! Nimbus uploader entry point.

mod app;
mod cli;
mod config;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting Nimbus uploader"
    );

    let mut config = config::Config::load()?;
    config.apply_cli(&cli);
    tracing::info!(server = %config.server_url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(app::run(config, cli));
    // A pending stdin read would otherwise keep the runtime alive.
    rt.shutdown_timeout(Duration::from_millis(200));
    let all_uploaded = result?;

    if !all_uploaded {
        std::process::exit(1);
    }
    Ok(())
}
