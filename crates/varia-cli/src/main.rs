//! varia CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use varia_cli::cmd;
use varia_cli::context::{Context, load_settings};
use varia_cli::{CacheCommands, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // offline, needs no settings or cache
    if let Commands::Variant {
        manifest,
        parameters,
    } = &cli.command
    {
        return cmd::variant::variant(manifest, parameters);
    }

    let settings = load_settings(cli.settings.as_deref())?;
    let ctx = Context::new(settings, cli.cache)?;

    match cli.command {
        Commands::Resolve { manifest } => cmd::resolve::resolve(&ctx, &manifest).await,
        Commands::Fetch { manifest } => cmd::fetch::fetch(&ctx, &manifest).await,
        Commands::Cache { command } => match command {
            CacheCommands::List => cmd::cache::list(&ctx),
        },
        Commands::Variant { .. } => Ok(()),
    }
}
