//! icsfeed CLI library.
//!
//! Reads named feeds from `config.toml`, fetches them through the ICS
//! adapter and prints the events of a range.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
