//! Application configuration derived from CLI arguments

use std::path::PathBuf;
use std::time::Duration;

use super::cli::CliArgs;
use super::environments::EnvironmentSet;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: PathBuf,
    pub environments: EnvironmentSet,
    pub connect_timeout: Duration,
    pub quiet: bool,
    pub verbose: bool,
}

impl AppConfig {
    /// Create configuration from CLI arguments, loading the environment file
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        args.validate()?;

        let environments = EnvironmentSet::load(&args.config).map_err(|e| e.to_string())?;

        Ok(Self {
            config_path: args.config.clone(),
            environments,
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            quiet: args.quiet,
            verbose: args.verbose,
        })
    }
}
