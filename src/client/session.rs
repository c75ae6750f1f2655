//! Live session against one environment
//!
//! A session owns its connection exclusively. Command failures are reported
//! as [`OperationError`] and leave the session usable; the caller decides
//! whether to retry or go back to environment selection.

use std::time::Duration;

use tracing::{debug, info};

use super::control_plane::{ControlPlane, ControlPlaneExt};
use super::raw_connection::{ConnectionFactory, RawConnection};
use crate::config::{ConnectionSpec, TlsPolicy};
use crate::utils::{ConnectionError, OperationError, RespValue};

/// Keys requested per SCAN round trip
pub const SCAN_COUNT: usize = 1000;

/// Server identification shown after connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_type: String,
    pub version: String,
}

impl ServerInfo {
    /// Extract product and version from `INFO server` output
    pub fn parse(info: &str) -> Self {
        let mut server_type = "Redis".to_string();
        let mut version = "unknown".to_string();

        for line in info.lines() {
            if let Some(v) = line.strip_prefix("redis_version:") {
                if version == "unknown" {
                    version = v.trim().to_string();
                }
            } else if let Some(v) = line.strip_prefix("valkey_version:") {
                version = v.trim().to_string();
                server_type = "Valkey".to_string();
            } else if line.trim() == "server_name:valkey" {
                server_type = "Valkey".to_string();
            }
        }

        ServerInfo {
            server_type,
            version,
        }
    }
}

/// An established connection plus the name it is shown under
pub struct Session<C: ControlPlane = RawConnection> {
    conn: C,
    display_name: String,
    scan_count: usize,
}

impl Session<RawConnection> {
    /// Connect, handshake and PING within `connect_timeout`
    pub fn connect(
        spec: &ConnectionSpec,
        policy: &TlsPolicy,
        display_name: &str,
        connect_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        info!(
            "Connecting to {} ({}, tls={}, verify={}, resp{})",
            display_name,
            spec,
            policy.use_tls(),
            policy.verify(),
            spec.protocol_version()
        );

        let factory = ConnectionFactory::new(spec, policy.clone(), connect_timeout);
        let conn = factory.create(&spec.host, spec.port)?;

        debug!("Session established for {}", display_name);
        Ok(Self::from_connection(conn, display_name))
    }
}

impl<C: ControlPlane> Session<C> {
    /// Wrap an already handshaken connection
    pub fn from_connection(conn: C, display_name: &str) -> Self {
        Self {
            conn,
            display_name: display_name.to_string(),
            scan_count: SCAN_COUNT,
        }
    }

    /// Override the SCAN COUNT hint
    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Run a command, turning transport failures and error replies into
    /// `OperationError`
    fn run(&mut self, command: &'static str, args: &[&str]) -> Result<RespValue, OperationError> {
        match self.conn.execute(args) {
            Ok(RespValue::Error(message)) => Err(OperationError::Server { command, message }),
            Ok(reply) => Ok(reply),
            Err(source) => Err(OperationError::Io { command, source }),
        }
    }

    pub fn ping(&mut self) -> Result<bool, OperationError> {
        match self.run("PING", &["PING"])? {
            RespValue::SimpleString(s) => Ok(s == "PONG"),
            other => Err(unexpected("PING", &other)),
        }
    }

    pub fn get(&mut self, key: &str) -> Result<Option<String>, OperationError> {
        match self.run("GET", &["GET", key])? {
            RespValue::Null => Ok(None),
            RespValue::BulkString(data) => text("GET", data).map(Some),
            RespValue::SimpleString(s) => Ok(Some(s)),
            other => Err(unexpected("GET", &other)),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), OperationError> {
        match self.run("SET", &["SET", key, value])? {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// Delete one key; returns 1 if it existed, 0 otherwise
    pub fn delete(&mut self, key: &str) -> Result<u64, OperationError> {
        self.delete_many(&[key])
    }

    /// Delete several keys with a single DEL; returns how many existed
    pub fn delete_many<S: AsRef<str>>(&mut self, keys: &[S]) -> Result<u64, OperationError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut args: Vec<&str> = Vec::with_capacity(keys.len() + 1);
        args.push("DEL");
        args.extend(keys.iter().map(|k| k.as_ref()));

        match self.run("DEL", &args)? {
            RespValue::Integer(n) if n >= 0 => Ok(n as u64),
            other => Err(unexpected("DEL", &other)),
        }
    }

    /// Fetch one SCAN page: (next cursor, keys)
    pub fn scan_page(
        &mut self,
        cursor: u64,
        pattern: &str,
    ) -> Result<(u64, Vec<String>), OperationError> {
        let cursor_str = cursor.to_string();
        let count_str = self.scan_count.to_string();
        let reply = self.run(
            "SCAN",
            &["SCAN", &cursor_str, "MATCH", pattern, "COUNT", &count_str],
        )?;

        // Reply: [cursor, [keys...]]
        let parts = match reply.as_array() {
            Some(parts) if parts.len() == 2 => parts,
            _ => return Err(unexpected("SCAN", &reply)),
        };

        let next = match &parts[0] {
            RespValue::BulkString(_) | RespValue::SimpleString(_) => parts[0]
                .as_str()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| unexpected("SCAN", &parts[0]))?,
            RespValue::Integer(i) if *i >= 0 => *i as u64,
            other => return Err(unexpected("SCAN", other)),
        };

        let keys = parts[1]
            .as_array()
            .ok_or_else(|| unexpected("SCAN", &parts[1]))?
            .iter()
            .map(|k| match k {
                RespValue::BulkString(data) => text("SCAN", data.clone()),
                RespValue::SimpleString(s) => Ok(s.clone()),
                other => Err(unexpected("SCAN", other)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((next, keys))
    }

    /// Lazily iterate SCAN pages for `pattern`
    pub fn scan(&mut self, pattern: &str) -> KeyScan<'_, C> {
        KeyScan {
            session: self,
            pattern: pattern.to_string(),
            cursor: 0,
            done: false,
        }
    }

    pub fn flush_database(&mut self) -> Result<(), OperationError> {
        match self.run("FLUSHDB", &["FLUSHDB"])? {
            RespValue::SimpleString(_) => Ok(()),
            other => Err(unexpected("FLUSHDB", &other)),
        }
    }

    pub fn db_size(&mut self) -> Result<u64, OperationError> {
        match self.run("DBSIZE", &["DBSIZE"])? {
            RespValue::Integer(n) if n >= 0 => Ok(n as u64),
            other => Err(unexpected("DBSIZE", &other)),
        }
    }

    pub fn server_info(&mut self) -> Result<ServerInfo, OperationError> {
        let info = self
            .conn
            .info("server")
            .map_err(|source| OperationError::Io {
                command: "INFO",
                source,
            })?;
        Ok(ServerInfo::parse(&info))
    }
}

fn text(command: &'static str, data: Vec<u8>) -> Result<String, OperationError> {
    String::from_utf8(data).map_err(|e| OperationError::InvalidUtf8 {
        command,
        escaped: e.as_bytes().escape_ascii().to_string(),
    })
}

fn unexpected(command: &'static str, reply: &RespValue) -> OperationError {
    OperationError::UnexpectedResponse {
        command,
        actual: reply.describe(),
    }
}

/// Cursor-driven SCAN iteration, one page per item
///
/// Stops after the server returns cursor 0 or after the first error.
pub struct KeyScan<'a, C: ControlPlane> {
    session: &'a mut Session<C>,
    pattern: String,
    cursor: u64,
    done: bool,
}

impl<C: ControlPlane> Iterator for KeyScan<'_, C> {
    type Item = Result<Vec<String>, OperationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.session.scan_page(self.cursor, &self.pattern) {
            Ok((next, keys)) => {
                self.cursor = next;
                if next == 0 {
                    self.done = true;
                }
                Some(Ok(keys))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
