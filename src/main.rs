//! Dermaclass - Main Entry Point
//!
//! Serves the classifier over HTTP, or classifies a single image from the
//! command line.

use clap::Parser;
use dermaclass::cli::{cmd_info, cmd_predict, cmd_serve, Cli, Commands, ServeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dermaclass=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => {
            cmd_serve(args).await?;
        }
        Some(Commands::Predict { image, model }) => {
            cmd_predict(&image, model)?;
        }
        Some(Commands::Info { model }) => {
            cmd_info(model)?;
        }
        None => {
            // Default: serve with environment configuration
            cmd_serve(ServeArgs::default()).await?;
        }
    }

    Ok(())
}
