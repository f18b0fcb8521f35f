//! knn-pipeline - Main Entry Point
//!
//! Runs cross-validated training when no subcommand is given.

use clap::Parser;
use knn_pipeline::cli::{cmd_predict, cmd_train, Cli, Commands, TrainArgs};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "knn_pipeline=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Train(args)) => cmd_train(&args)?,
        Some(Commands::Predict(args)) => cmd_predict(&args)?,
        None => cmd_train(&TrainArgs::default())?,
    }

    Ok(())
}
