//! remedy-intake CLI entry point.

use anyhow::Result;
use clap::Parser;

use remedy_intake::cli::{commands, handle_error, Cli, Commands};
use remedy_intake::infrastructure::{ConfigLoader, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&config.logging)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config, cli.json).await,
        Commands::Cooldowns(args) => commands::cooldowns::execute(args, &config, cli.json).await,
        Commands::Policy(args) => commands::policy::execute(args, cli.json).await,
    }
}
