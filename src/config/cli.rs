//! Command-line argument parsing
//!
//! The tool is driven by interactive prompts; flags only cover where the
//! environment list lives, the connect timeout and log verbosity.

use clap::Parser;
use std::path::PathBuf;

/// Interactive manager for Valkey/Redis environments
#[derive(Parser, Debug, Clone)]
#[command(name = "valkey-env-manager")]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Environment list (sectioned key = value file)
    #[arg(short = 'c', long = "config", default_value = "config.ini")]
    pub config: PathBuf,

    /// Connection timeout in milliseconds
    #[arg(long = "connect-timeout", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_ms == 0 {
            return Err("--connect-timeout must be at least 1ms".to_string());
        }

        if self.quiet && self.verbose {
            return Err("--quiet and --verbose are mutually exclusive".to_string());
        }

        Ok(())
    }
}
