mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing_with_level(&cli.log_level);

    let format = cli.format.unwrap_or_default();
    let providers = config::resolve_providers(cli.providers.as_deref())?;
    tracing::debug!(path = %providers.display(), "Using provider file");

    match &cli.command {
        Commands::Check => commands::check::check(&providers, format)?,
        Commands::Map(args) => commands::map::map(&providers, args, format).await?,
        Commands::Watch => commands::watch::watch(&providers).await?,
    }

    Ok(())
}
