//! Error types for valkey-env-manager

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid connection details: {0}")]
    Validation(#[from] ValidationError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Operation failed: {0}")]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Confirmation(#[from] ConfirmationMismatch),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("end of input")]
    EndOfInput,
}

/// Malformed connection input (prompt or config file)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("invalid port '{0}': expected a number between 1 and 65535")]
    InvalidPort(String),

    #[error("invalid db index '{0}': expected a non-negative number")]
    InvalidDb(String),

    #[error("invalid value '{value}' for '{field}': expected one of y/yes/true/1/on or n/no/false/0/off")]
    InvalidFlag { field: &'static str, value: String },
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("TLS handshake failed: {0}")]
    TlsFailed(String),

    #[error("Protocol handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Connection closed unexpectedly")]
    Closed,

    #[error("Connection timeout after {0}ms")]
    Timeout(u64),
}

impl ConnectionError {
    /// Classify an I/O failure during the post-connect handshake
    pub fn from_handshake_io(stage: &str, err: io::Error, timeout_ms: u64) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout(timeout_ms),
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe => Self::Closed,
            _ => Self::HandshakeFailed(format!("{}: {}", stage, err)),
        }
    }
}

/// Errors from commands issued on an established session
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("{command} failed: {source}")]
    Io {
        command: &'static str,
        source: io::Error,
    },

    #[error("{command} rejected by server: {message}")]
    Server {
        command: &'static str,
        message: String,
    },

    #[error("Unexpected {command} response: {actual}")]
    UnexpectedResponse {
        command: &'static str,
        actual: String,
    },

    /// Keys and values are handled as text; binary data is refused rather than renamed
    #[error("{command} returned data that is not valid UTF-8: \"{escaped}\"")]
    InvalidUtf8 {
        command: &'static str,
        escaped: String,
    },
}

/// RESP protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid RESP type byte: {0}")]
    InvalidType(char),

    #[error("Invalid length: {0}")]
    InvalidLength(String),

    #[error("Invalid integer: {0}")]
    InvalidInteger(String),

    #[error("Invalid double: {0}")]
    InvalidDouble(String),

    #[error("Empty RESP line")]
    EmptyLine,
}

impl From<ProtocolError> for io::Error {
    fn from(err: ProtocolError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Destructive operation cancelled because the typed token did not match
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Confirmation did not match '{expected}'. Operation cancelled.")]
pub struct ConfirmationMismatch {
    pub expected: String,
}

/// Environment file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: ini::ParseError,
    },

    #[error("{path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, ManagerError>;
