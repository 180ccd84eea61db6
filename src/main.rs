use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use estuary::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let path = commands::config_path(cli.config)?;
            commands::serve(&path).await?;
        }
        Commands::Admin { socket, action } => {
            commands::admin(cli.config, socket, action).await?;
        }
        Commands::Opml { action } => {
            let path = commands::config_path(cli.config)?;
            commands::opml(&path, action)?;
        }
        Commands::ConfigTemplate => commands::config_template(),
    }

    Ok(())
}
