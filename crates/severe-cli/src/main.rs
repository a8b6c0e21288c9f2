//! Severe CLI - deploy serverless functions from a declaration file.

mod commands;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(name = "severe")]
#[command(about = "Deploy serverless functions from a declaration file")]
#[command(version)]
struct Cli {
    /// Declaration key; omit to list every key
    key: Option<String>,

    /// Action to run for the key; omit to list the available actions
    action: Option<Action>,

    /// JSON payload passed to `invoke`
    #[arg(long)]
    payload: Option<String>,

    /// Configuration file (defaults to severe.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// What to do with a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Build, upload and reconcile the function
    Upload,
    /// Show the live function and its rules
    Info,
    /// Detach and delete the function
    Remove,
    /// Invoke the function synchronously
    Invoke,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = commands::run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
