//! Control Plane trait for server communication
//!
//! This trait abstracts command execution so that sessions, scans and
//! batched deletes can run against a live connection or an in-memory fake.
//!
//! The trait allows different implementations:
//! - `RawConnection`: Direct TCP/TLS with custom RESP codec
//! - `InMemoryControlPlane`: test double (tests only)

use crate::utils::RespValue;
use std::io;
use std::time::Duration;

/// Control plane operations trait
///
/// Implementations handle the underlying protocol and connection management.
/// Higher-level operations (handshake, key operations) are built on top.
pub trait ControlPlane {
    /// Execute a command with string arguments
    ///
    /// # Example
    /// ```ignore
    /// let response = conn.execute(&["PING"])?;
    /// let response = conn.execute(&["SET", "key", "value"])?;
    /// ```
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue>;

    /// Set read and write timeouts; `None` blocks indefinitely
    fn set_io_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

/// Extension trait with connection handshake operations
///
/// These are convenience methods built on top of the base `ControlPlane` trait.
pub trait ControlPlaneExt: ControlPlane {
    /// Send PING and verify PONG response
    fn ping(&mut self) -> io::Result<bool> {
        match self.execute(&["PING"])? {
            RespValue::SimpleString(s) => Ok(s == "PONG"),
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
            _ => Ok(false),
        }
    }

    /// Negotiate RESP3 with `HELLO 3`, authenticating in the same round trip
    ///
    /// Returns the server's HELLO reply (a map under RESP3).
    fn hello(&mut self, password: Option<&str>, username: Option<&str>) -> io::Result<RespValue> {
        let response = match password {
            Some(pass) => {
                let user = username.unwrap_or("default");
                self.execute(&["HELLO", "3", "AUTH", user, pass])?
            }
            None => self.execute(&["HELLO", "3"])?,
        };

        match response {
            RespValue::Error(e) if is_auth_error(&e) => {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, e))
            }
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::Unsupported, e)),
            reply @ (RespValue::Map(_) | RespValue::Array(_)) => Ok(reply),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected HELLO response: {}", other.describe()),
            )),
        }
    }

    /// Send AUTH command
    fn authenticate(&mut self, password: &str, username: Option<&str>) -> io::Result<()> {
        let response = match username {
            Some(user) => self.execute(&["AUTH", user, password])?,
            None => self.execute(&["AUTH", password])?,
        };

        match response {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::PermissionDenied, e)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected AUTH response: {}", other.describe()),
            )),
        }
    }

    /// Send SELECT command
    fn select_db(&mut self, db: u32) -> io::Result<()> {
        let db_str = db.to_string();
        match self.execute(&["SELECT", &db_str])? {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected SELECT response: {}", other.describe()),
            )),
        }
    }

    /// Get INFO for a section (empty string returns the default sections)
    fn info(&mut self, section: &str) -> io::Result<String> {
        let response = if section.is_empty() {
            self.execute(&["INFO"])?
        } else {
            self.execute(&["INFO", section])?
        };

        match response {
            RespValue::BulkString(data) => String::from_utf8(data).map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid UTF-8: {}", e))
            }),
            RespValue::Error(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected INFO response: {}", other.describe()),
            )),
        }
    }
}

// Blanket implementation: any ControlPlane automatically gets ControlPlaneExt
impl<T: ControlPlane + ?Sized> ControlPlaneExt for T {}

/// Check if a server error is an authentication failure
pub fn is_auth_error(message: &str) -> bool {
    let upper = message.to_ascii_uppercase();
    upper.starts_with("WRONGPASS")
        || upper.starts_with("NOAUTH")
        || upper.contains("INVALID PASSWORD")
        || upper.contains("INVALID USERNAME-PASSWORD")
}
