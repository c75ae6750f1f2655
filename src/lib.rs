//! valkey-env-manager library
//!
//! Interactive manager for Redis/Valkey environments: typed connection
//! specs with secure TLS defaults, a small RESP client, cursor-based
//! pattern scans and chunked bulk deletes.

pub mod client;
pub mod config;
pub mod keyspace;
pub mod manager;
pub mod utils;
