//! Command-line interface definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// icsfeed - Show events from ICS calendar feeds
#[derive(Debug, Parser)]
#[command(name = "icsfeed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "ICSFEED_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the events of a feed
    Events(EventsArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `icsfeed events`.
#[derive(Debug, Clone, Default, Args)]
pub struct EventsArgs {
    /// Name of a feed from the configuration file
    #[arg(long, short, conflicts_with = "url")]
    pub feed: Option<String>,

    /// Feed URL, instead of a configured feed
    #[arg(long, short)]
    pub url: Option<String>,

    /// Extra request header as NAME:VALUE (can be repeated)
    #[arg(long = "header", short = 'H', requires = "url", action = clap::ArgAction::Append)]
    pub headers: Vec<String>,

    /// First day shown (YYYY-MM-DD, default today)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Day after the last day shown (YYYY-MM-DD)
    #[arg(long, conflicts_with = "days")]
    pub to: Option<NaiveDate>,

    /// Number of days shown
    #[arg(long)]
    pub days: Option<u32>,

    /// IANA zone for floating times, overriding the configuration
    #[arg(long)]
    pub floating_timezone: Option<String>,

    /// Output events as JSON
    #[arg(long)]
    pub json: bool,
}

/// Configuration subcommands.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Dump,
    /// Validate the configuration file
    Validate,
    /// Show the configuration file path
    Path,
}
