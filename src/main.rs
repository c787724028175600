use clap::Parser;
use netmetricsd::cli::{commands, Cli};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting netmetricsd v{}", netmetricsd::VERSION);

    if let Err(e) = commands::run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
