//! Configuration commands.

use std::path::Path;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Prints the effective configuration as TOML.
pub fn dump(config: &CliConfig, path: &Path) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| CliError::config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Validates the configuration and reports what it defines.
pub fn validate(config: &CliConfig) -> CliResult<()> {
    config.validate().map_err(CliError::config)?;
    for feed in &config.feeds {
        println!("feed `{}`: {}", feed.name, feed.url);
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Shows the configuration file path.
pub fn path(path: &Path) -> CliResult<()> {
    let state = if path.exists() { "" } else { " (not found)" };
    println!("config: {}{}", path.display(), state);
    Ok(())
}
