//! icsfeed CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use icsfeed_core::{TracingConfig, init_tracing};

use icsfeed_cli::cli::{Cli, Command, ConfigAction};
use icsfeed_cli::commands;
use icsfeed_cli::config::CliConfig;
use icsfeed_cli::error::{CliError, CliResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = if cli.debug {
        TracingConfig::debug()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let path = cli.config.clone().unwrap_or_else(CliConfig::default_path);

    if let Command::Config {
        action: ConfigAction::Path,
    } = cli.command
    {
        return commands::config::path(&path);
    }

    // An explicit path must exist; the default one is optional.
    let config = match cli.config {
        Some(ref explicit) => CliConfig::load_from(explicit),
        None => CliConfig::load(),
    }
    .map_err(CliError::Config)?;

    match cli.command {
        Command::Events(ref args) => commands::events::run(args, &config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&path),
        },
    }
}
