mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, ServerConfig};

mod cmd;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match ServerConfig::load(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Run => cmd::run::run(config).await,
            Commands::InitSchema => cmd::init_schema::run(config).await,
            Commands::Insert(args) => cmd::insert::run(config, args).await,
        },
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
