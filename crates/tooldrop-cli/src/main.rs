//! tooldrop CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tooldrop_cli::cmd;
use tooldrop_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install(args) => cmd::install::install(&args).await,
        Commands::Tools => {
            cmd::tools::tools();
            Ok(())
        }
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
