//! Utility modules

pub mod error;
pub mod resp;
pub mod signal;

pub use error::{
    ConfigError, ConfirmationMismatch, ConnectionError, ManagerError, OperationError,
    ProtocolError, Result, ValidationError,
};
pub use resp::{RespDecoder, RespEncoder, RespValue};
pub use signal::{InterruptFlag, OperationGuard};
