#![warn(clippy::all)]
#![allow(clippy::pedantic)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use topicbot_common::config::{config_path, Config};
use topicbot_common::logging::init_logging;

mod runner;

/// `topicbot` - multi-turn dialogue engine over stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "topicbot")]
#[command(version = "0.1.0")]
#[command(about = "Run the topicbot dialogue engine on JSON lines.", long_about = None)]
struct Cli {
    /// Config file (default: ~/.topicbot/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read messages from stdin, write responses to stdout as they come due
    Run {
        /// Scheduler tick in milliseconds
        #[arg(long, default_value = "250")]
        tick_ms: u64,
    },

    /// Validate configuration and plugin directories, then exit
    CheckConfig,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init(force: bool) -> Result<()> {
    let path = config_path();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save()?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Load and validate the config, then install logging from it.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load_and_validate(path)?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => init(force),
        Commands::Run { tick_ms } => {
            runner::run(load_config(cli.config.as_deref())?, tick_ms).await
        }
        Commands::CheckConfig => runner::check(&load_config(cli.config.as_deref())?).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["topicbot", "--config", "/tmp/bot.json", "run", "--tick-ms", "50"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bot.json")));
        assert!(matches!(cli.command, Commands::Run { tick_ms: 50 }));
    }
}
