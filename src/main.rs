//! cbl CLI binary entry point.

use clap::Parser;
use cbl::cli::{Cli, Commands};
use cbl::config::CblConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match CblConfig::load(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Login => cbl::cli::auth::handle_login(config).await,
            Commands::Status => cbl::cli::auth::handle_status(config).await,
            Commands::Logout => cbl::cli::auth::handle_logout(config).await,
            Commands::Run(args) => cbl::cli::auth::handle_run(config, args.login).await,
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
