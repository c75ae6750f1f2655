//! Configuration module

pub mod app_config;
pub mod cli;
pub mod connection_spec;
pub mod environments;
pub mod tls_config;

pub use app_config::AppConfig;
pub use cli::CliArgs;
pub use connection_spec::{parse_flag, ConnectionFields, ConnectionSpec, DEFAULT_DB, DEFAULT_PORT};
pub use environments::{Environment, EnvironmentSet};
pub use tls_config::{default_trust_bundle, TlsConfig, TlsPolicy};
