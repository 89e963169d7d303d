//! CLI module for AeroMQ
//!
//! Provides command-line interface for:
//! - init: Write a default configuration file
//! - start: Boot the broker and serve HTTP
//! - check: Validate a configuration file

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, init, run, run_command, start};
pub use config::Config;
pub use errors::{CliError, CliErrorCode, CliResult};
