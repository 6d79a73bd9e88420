//! Entry point: parse arguments, set up logging, load configuration and
//! route to the subcommand handler.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::debug;

use crate::args::{Cli, Commands};
use crate::commands::{
    generate::GenerateCommand, prepare::PrepareCommand, run::RunCommand, CommandHandler,
};
use crate::error::CliError;
use trident_core::config::{load_config, parse_key_value_pair, Config};

pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    // a second init (tests running several commands) is harmless
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level)).try_init();
}

pub fn load(cli: &Cli) -> Result<Config> {
    let mut overrides = Vec::with_capacity(cli.overrides.len());
    for pair in &cli.overrides {
        let parsed = parse_key_value_pair(pair).ok_or_else(|| {
            CliError::ArgParse(format!("override '{}' is not KEY=VALUE", pair))
        })?;
        overrides.push(parsed);
    }
    let config = load_config(cli.config.as_deref(), &overrides)?;
    debug!("Loaded configuration: {:?}", config);
    Ok(config)
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = load(&cli)?;
    match cli.command {
        Commands::Run {
            mode,
            report,
            synthetic,
            input,
            output,
        } => {
            RunCommand {
                mode,
                report,
                synthetic,
                input,
                output,
            }
            .execute(&config)
            .await
        }
        Commands::Prepare {
            target,
            synthetic,
            input,
            output,
        } => {
            PrepareCommand {
                target,
                synthetic,
                input,
                output,
            }
            .execute(&config)
            .await
        }
        Commands::Generate {
            businesses,
            users,
            reviews,
            output,
        } => {
            GenerateCommand {
                businesses,
                users,
                reviews,
                output,
            }
            .execute(&config)
            .await
        }
    }
}

/// Parses the process arguments and runs the selected command.
pub async fn run() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => return Err(CliError::ArgParse(err.to_string()).into()),
        Err(err) => {
            // --help and --version
            err.print()?;
            return Ok(());
        }
    };
    init_logging(cli.verbose);
    execute(cli).await
}
