//! CLI argument definitions using clap
//!
//! Commands:
//! - aeromq init --config <path>
//! - aeromq start --config <path> [--host <host>] [--port <port>]
//! - aeromq check --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AeroMQ - An in-memory publish/subscribe broker with an HTTP surface
#[derive(Parser, Debug)]
#[command(name = "aeromq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a configuration file with default values
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./aeromq.json")]
        config: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Start the broker and its HTTP server
    Start {
        /// Path to configuration file (defaults apply when absent)
        #[arg(long, default_value = "./aeromq.json")]
        config: PathBuf,

        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a configuration file and print the effective configuration
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./aeromq.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
