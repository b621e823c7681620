//! Steward CLI
//!
//! Ingest union contracts and run retrieval against them from the terminal.

use anyhow::Result;
use clap::Parser;

mod app;
mod commands;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = {
        let mut config = steward_core::Config::load()?;
        if let Some(data_dir) = &cli.data_dir {
            config.data_dir = Some(data_dir.clone());
        }
        config
    };

    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(args, &config).await,
        Commands::Query(args) => commands::query::run(args, &config, cli.format).await,
        Commands::Wage(args) => commands::wage::run(args, &config, cli.format).await,
        Commands::Status(args) => commands::status::run(args, &config, cli.format).await,
    }
}
