//! Raw TCP connection to a key-value server
//!
//! This module provides direct TCP (and TLS) connections speaking RESP
//! through the in-crate codec.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::control_plane::{ControlPlane, ControlPlaneExt};
use crate::config::{ConnectionSpec, TlsPolicy};
use crate::utils::{ConnectionError, RespDecoder, RespEncoder, RespValue};

/// Raw connection wrapper (TCP or TLS)
///
/// For TCP, we split into separate reader/writer.
/// For TLS, the stream cannot be cloned, so a single buffered reader owns it
/// and writes go through `get_mut()`.
pub enum RawConnection {
    Tcp {
        writer: BufWriter<TcpStream>,
        reader: BufReader<TcpStream>,
    },
    #[cfg(feature = "native-tls-backend")]
    NativeTls {
        stream: BufReader<native_tls::TlsStream<TcpStream>>,
    },
}

/// Time budget shared by every step of one connection attempt
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn timeout_error(&self) -> ConnectionError {
        ConnectionError::Timeout(self.budget.as_millis() as u64)
    }

    /// Time left, or `Timeout` once the budget is spent
    pub fn remaining(&self) -> Result<Duration, ConnectionError> {
        let left = self.at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            Err(self.timeout_error())
        } else {
            Ok(left)
        }
    }
}

/// Resolve on a helper thread so a stalled resolver cannot outlive the deadline
fn resolve_addr(host: &str, port: u16, deadline: Deadline) -> Result<SocketAddr, ConnectionError> {
    let connect_failed = |source| ConnectionError::ConnectFailed {
        host: host.to_string(),
        port,
        source,
    };

    let (tx, rx) = mpsc::channel();
    let target = (host.to_string(), port);
    thread::Builder::new()
        .name("resolve".to_string())
        .spawn(move || {
            let result = target.to_socket_addrs().map(|mut addrs| addrs.next());
            // The receiver is gone if the caller already timed out
            let _ = tx.send(result);
        })
        .map_err(connect_failed)?;

    match rx.recv_timeout(deadline.remaining()?) {
        Ok(Ok(Some(addr))) => Ok(addr),
        Ok(Ok(None)) => Err(connect_failed(io::Error::new(
            io::ErrorKind::NotFound,
            "No addresses found",
        ))),
        Ok(Err(e)) => Err(connect_failed(e)),
        Err(RecvTimeoutError::Timeout) => Err(deadline.timeout_error()),
        Err(RecvTimeoutError::Disconnected) => Err(connect_failed(io::Error::new(
            io::ErrorKind::Other,
            "resolver thread exited",
        ))),
    }
}

fn open_stream(host: &str, port: u16, deadline: Deadline) -> Result<TcpStream, ConnectionError> {
    let addr = resolve_addr(host, port, deadline)?;

    let stream = TcpStream::connect_timeout(&addr, deadline.remaining()?).map_err(|e| {
        if e.kind() == io::ErrorKind::TimedOut {
            deadline.timeout_error()
        } else {
            ConnectionError::ConnectFailed {
                host: host.to_string(),
                port,
                source: e,
            }
        }
    })?;

    stream.set_nodelay(true).ok();
    // Bounds the TLS handshake; the RESP handshake narrows it per step
    let left = deadline.remaining()?;
    stream.set_read_timeout(Some(left)).ok();
    stream.set_write_timeout(Some(left)).ok();

    Ok(stream)
}

impl RawConnection {
    /// Create new TCP connection
    pub fn connect_tcp(host: &str, port: u16, deadline: Deadline) -> Result<Self, ConnectionError> {
        let stream = open_stream(host, port, deadline)?;

        let writer = BufWriter::with_capacity(
            16384,
            stream
                .try_clone()
                .map_err(|e| ConnectionError::ConnectFailed {
                    host: host.to_string(),
                    port,
                    source: e,
                })?,
        );
        let reader = BufReader::with_capacity(16384, stream);

        Ok(RawConnection::Tcp { writer, reader })
    }

    /// Create new TLS connection
    ///
    /// A verified policy with a CA bundle trusts that bundle only.
    #[cfg(feature = "native-tls-backend")]
    pub fn connect_tls(
        host: &str,
        port: u16,
        deadline: Deadline,
        policy: &TlsPolicy,
    ) -> Result<Self, ConnectionError> {
        use native_tls::TlsConnector;

        let mut builder = TlsConnector::builder();

        match policy {
            TlsPolicy::Unverified => {
                builder.danger_accept_invalid_certs(true);
                builder.danger_accept_invalid_hostnames(true);
            }
            TlsPolicy::Verified {
                ca_bundle: Some(ca_path),
            } => {
                let ca_data = std::fs::read(ca_path).map_err(|e| {
                    ConnectionError::TlsFailed(format!(
                        "Failed to read CA bundle {}: {}",
                        ca_path.display(),
                        e
                    ))
                })?;

                let roots = root_certificates(&ca_data).map_err(|e| {
                    ConnectionError::TlsFailed(format!(
                        "Invalid CA bundle {}: {}",
                        ca_path.display(),
                        e
                    ))
                })?;
                debug!("Loaded {} root certificates from {}", roots.len(), ca_path.display());

                builder.disable_built_in_roots(true);
                for cert in roots {
                    builder.add_root_certificate(cert);
                }
            }
            TlsPolicy::Verified { ca_bundle: None } => {}
            TlsPolicy::Disabled => {
                return Err(ConnectionError::TlsFailed(
                    "TLS requested with a disabled policy".to_string(),
                ));
            }
        }

        let connector = builder.build().map_err(|e| {
            ConnectionError::TlsFailed(format!("Failed to build TLS connector: {}", e))
        })?;

        let tcp_stream = open_stream(host, port, deadline)?;

        let tls_stream = connector.connect(host, tcp_stream).map_err(|e| match e {
            native_tls::HandshakeError::Failure(e) => ConnectionError::TlsFailed(e.to_string()),
            native_tls::HandshakeError::WouldBlock(_) => deadline.timeout_error(),
        })?;

        Ok(RawConnection::NativeTls {
            stream: BufReader::with_capacity(16384, tls_stream),
        })
    }

    /// Write bytes to connection
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            RawConnection::Tcp { writer, .. } => writer.write_all(buf),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => stream.get_mut().write_all(buf),
        }
    }

    /// Flush write buffer
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            RawConnection::Tcp { writer, .. } => writer.flush(),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => stream.get_mut().flush(),
        }
    }

    /// Read a single RESP response
    fn read_response(&mut self) -> io::Result<RespValue> {
        match self {
            RawConnection::Tcp { reader, .. } => RespDecoder::new(reader).decode(),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => RespDecoder::new(stream).decode(),
        }
    }

    /// Send pre-encoded command and receive response
    pub fn execute_encoded(&mut self, encoder: &RespEncoder) -> io::Result<RespValue> {
        self.write_all(encoder.as_bytes())?;
        self.flush()?;
        self.read_response()
    }

    fn tcp_stream(&self) -> &TcpStream {
        match self {
            RawConnection::Tcp { reader, .. } => reader.get_ref(),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => stream.get_ref().get_ref(),
        }
    }
}

impl ControlPlane for RawConnection {
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue> {
        let capacity = 16 + args.iter().map(|a| a.len() + 16).sum::<usize>();
        let mut encoder = RespEncoder::with_capacity(capacity);
        encoder.encode_command_str(args);
        self.execute_encoded(&encoder)
    }

    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let stream = self.tcp_stream();
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)
    }
}

/// Parse every certificate in a PEM bundle; an empty bundle is an error
#[cfg(feature = "native-tls-backend")]
fn root_certificates(pem: &[u8]) -> Result<Vec<native_tls::Certificate>, String> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .map(|der| {
            let der = der.map_err(|e| e.to_string())?;
            native_tls::Certificate::from_der(&der).map_err(|e| e.to_string())
        })
        .collect::<Result<Vec<_>, String>>()?;

    if certs.is_empty() {
        return Err("no certificates found".to_string());
    }
    Ok(certs)
}

/// Connection factory for creating ready-to-use connections
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    pub connect_timeout: Duration,
    pub tls_policy: TlsPolicy,
    pub auth_password: Option<String>,
    pub auth_username: Option<String>,
    pub dbnum: u32,
    pub legacy_protocol: bool,
}

impl ConnectionFactory {
    pub fn new(spec: &ConnectionSpec, tls_policy: TlsPolicy, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            tls_policy,
            auth_password: spec.password.clone(),
            auth_username: spec.username.clone(),
            dbnum: spec.db,
            legacy_protocol: spec.legacy_protocol,
        }
    }

    /// Connect, negotiate the protocol, authenticate, select the db and PING
    ///
    /// Resolution, connect, TLS and the handshake share one `connect_timeout`.
    pub fn create(&self, host: &str, port: u16) -> Result<RawConnection, ConnectionError> {
        let deadline = Deadline::after(self.connect_timeout);

        let mut conn = match &self.tls_policy {
            TlsPolicy::Disabled => RawConnection::connect_tcp(host, port, deadline)?,
            #[cfg(feature = "native-tls-backend")]
            policy => RawConnection::connect_tls(host, port, deadline, policy)?,
            #[cfg(not(feature = "native-tls-backend"))]
            _ => {
                return Err(ConnectionError::TlsFailed(
                    "TLS support not compiled in".to_string(),
                ));
            }
        };

        self.handshake_within(&mut conn, deadline)?;

        // Operations run without a client-side timeout
        conn.set_io_timeout(None)
            .map_err(|e| ConnectionError::ConnectFailed {
                host: host.to_string(),
                port,
                source: e,
            })?;

        Ok(conn)
    }

    /// Post-connect handshake, shared with non-network control planes
    pub fn handshake<C: ControlPlane + ?Sized>(&self, conn: &mut C) -> Result<(), ConnectionError> {
        self.handshake_within(conn, Deadline::after(self.connect_timeout))
    }

    /// Handshake whose steps together stay within `deadline`
    pub fn handshake_within<C: ControlPlane + ?Sized>(
        &self,
        conn: &mut C,
        deadline: Deadline,
    ) -> Result<(), ConnectionError> {
        let timeout_ms = self.connect_timeout.as_millis() as u64;
        let password = self.auth_password.as_deref();
        let username = self.auth_username.as_deref();

        let narrow = |conn: &mut C, stage: &str| -> Result<(), ConnectionError> {
            let left = deadline.remaining()?;
            conn.set_io_timeout(Some(left))
                .map_err(|e| ConnectionError::from_handshake_io(stage, e, timeout_ms))
        };

        if self.legacy_protocol {
            if let Some(pass) = password {
                narrow(conn, "AUTH")?;
                conn.authenticate(pass, username).map_err(|e| auth_error("AUTH", e, timeout_ms))?;
            }
        } else {
            narrow(conn, "HELLO")?;
            conn.hello(password, username).map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => ConnectionError::AuthFailed(e.to_string()),
                io::ErrorKind::Unsupported => ConnectionError::HandshakeFailed(format!(
                    "server rejected RESP3 ({}); try legacy mode",
                    e
                )),
                _ => ConnectionError::from_handshake_io("HELLO", e, timeout_ms),
            })?;
            debug!("Negotiated RESP3");
        }

        if self.dbnum != 0 {
            narrow(conn, "SELECT")?;
            conn.select_db(self.dbnum)
                .map_err(|e| ConnectionError::from_handshake_io("SELECT", e, timeout_ms))?;
        }

        narrow(conn, "PING")?;
        match conn.ping() {
            Ok(true) => Ok(()),
            Ok(false) => Err(ConnectionError::HandshakeFailed(
                "server did not answer PING with PONG".to_string(),
            )),
            Err(e) if e.kind() == io::ErrorKind::Other => {
                // Server-side error reply, e.g. NOAUTH when a password is required
                Err(auth_error("PING", e, timeout_ms))
            }
            Err(e) => Err(ConnectionError::from_handshake_io("PING", e, timeout_ms)),
        }
    }
}

fn auth_error(stage: &str, err: io::Error, timeout_ms: u64) -> ConnectionError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ConnectionError::AuthFailed(err.to_string()),
        io::ErrorKind::Other if super::control_plane::is_auth_error(&err.to_string()) => {
            ConnectionError::AuthFailed(err.to_string())
        }
        _ => ConnectionError::from_handshake_io(stage, err, timeout_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::InMemoryControlPlane;
    use crate::config::{ConnectionFields, ConnectionSpec};

    fn factory(fields: ConnectionFields) -> ConnectionFactory {
        let spec = ConnectionSpec::from_fields(&fields).unwrap();
        ConnectionFactory::new(&spec, TlsPolicy::Disabled, Duration::from_secs(5))
    }

    fn fields(password: Option<&str>, db: &str, legacy: &str) -> ConnectionFields {
        ConnectionFields {
            host: Some("127.0.0.1".to_string()),
            password: password.map(str::to_string),
            db: Some(db.to_string()),
            legacymode: Some(legacy.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_handshake_resp3_with_auth() {
        let mut plane = InMemoryControlPlane::new().with_password("pw");
        factory(fields(Some("pw"), "2", "n")).handshake(&mut plane).unwrap();
        assert_eq!(plane.commands()[0], vec!["HELLO", "3", "AUTH", "default", "pw"]);
        assert_eq!(plane.commands()[1], vec!["SELECT", "2"]);
        assert_eq!(plane.commands()[2], vec!["PING"]);
    }

    #[test]
    fn test_handshake_legacy_uses_auth() {
        let mut plane = InMemoryControlPlane::new().with_password("pw");
        factory(fields(Some("pw"), "0", "y")).handshake(&mut plane).unwrap();
        assert_eq!(plane.commands()[0], vec!["AUTH", "pw"]);
        // db 0 is the server default, no SELECT
        assert_eq!(plane.commands()[1], vec!["PING"]);
    }

    #[test]
    fn test_handshake_wrong_password() {
        let mut plane = InMemoryControlPlane::new().with_password("right");
        let err = factory(fields(Some("wrong"), "0", "n"))
            .handshake(&mut plane)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::AuthFailed(_)), "{err}");

        let mut plane = InMemoryControlPlane::new().with_password("right");
        let err = factory(fields(Some("wrong"), "0", "y"))
            .handshake(&mut plane)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::AuthFailed(_)), "{err}");
    }

    #[test]
    fn test_handshake_missing_password() {
        let mut plane = InMemoryControlPlane::new().with_password("right");
        let err = factory(fields(None, "0", "y"))
            .handshake(&mut plane)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::AuthFailed(_)), "{err}");
    }

    #[test]
    fn test_handshake_resp3_unsupported() {
        let mut plane = InMemoryControlPlane::new().without_hello();
        let err = factory(fields(None, "0", "n"))
            .handshake(&mut plane)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::HandshakeFailed(_)), "{err}");
    }

    #[test]
    fn test_handshake_steps_share_one_deadline() {
        let budget = Duration::from_secs(5);
        let mut plane = InMemoryControlPlane::new().with_password("pw");
        factory(fields(Some("pw"), "2", "n")).handshake(&mut plane).unwrap();

        // HELLO, SELECT and PING each get what is left, never a fresh budget
        let timeouts: Vec<Duration> = plane.io_timeouts().iter().map(|t| t.unwrap()).collect();
        assert_eq!(timeouts.len(), 3);
        assert!(timeouts.iter().all(|t| *t <= budget));
        assert!(timeouts.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_handshake_with_spent_deadline_times_out() {
        let mut plane = InMemoryControlPlane::new();
        let spent = Deadline::after(Duration::ZERO);
        let err = factory(fields(None, "0", "n"))
            .handshake_within(&mut plane, spent)
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout(_)), "{err}");
        assert!(plane.commands().is_empty());
    }

    #[test]
    fn test_resolve_within_deadline() {
        let addr = resolve_addr("127.0.0.1", 6380, Deadline::after(Duration::from_secs(5))).unwrap();
        assert_eq!(addr.port(), 6380);
        assert!(addr.ip().is_loopback());

        let err = resolve_addr("127.0.0.1", 6380, Deadline::after(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout(_)), "{err}");
    }

    #[cfg(feature = "native-tls-backend")]
    const TEST_CA: &str = "-----BEGIN CERTIFICATE-----
MIIBoTCCAUegAwIBAgIUVzeAPh0Tuk0eAIvcIa7OMKTRkVgwCgYIKoZIzj0EAwIw
JTEjMCEGA1UEAwwadmFsa2V5LWVudi1tYW5hZ2VyIHRlc3QgQ0EwIBcNMjYxMDE4
MDY0NzMwWhgPMjEyNjA5MjQwNjQ3MzBaMCUxIzAhBgNVBAMMGnZhbGtleS1lbnYt
bWFuYWdlciB0ZXN0IENBMFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEeu6OlJmn
nBn3po7JSFpO5uPuOnmaqhLI00Rtw1OyxSJ1CqL4d6IAx/+xfZuvGCsyyS6jvcLs
na5FR6284AjJdqNTMFEwHQYDVR0OBBYEFBcmiI30pSL/0b70jzvltJa3lDTSMB8G
A1UdIwQYMBaAFBcmiI30pSL/0b70jzvltJa3lDTSMA8GA1UdEwEB/wQFMAMBAf8w
CgYIKoZIzj0EAwIDSAAwRQIhAP+1V0d6Hk8y3z6wbTPfPe34GsI5nDLS345dUnAz
HPQZAiB3y8/CE6F4ekcvqN7eKAa6KxHRf+CleTRgZuA3UhFEvA==
-----END CERTIFICATE-----
";

    #[cfg(feature = "native-tls-backend")]
    #[test]
    fn test_root_certificates_from_bundle() {
        let bundle = format!("# test bundle\n{TEST_CA}\n{TEST_CA}");
        assert_eq!(root_certificates(bundle.as_bytes()).unwrap().len(), 2);
    }

    #[cfg(feature = "native-tls-backend")]
    #[test]
    fn test_root_certificates_rejects_empty_bundle() {
        let err = root_certificates(b"not a certificate\n").err().unwrap();
        assert!(err.contains("no certificates"), "{err}");
    }

    #[cfg(feature = "native-tls-backend")]
    #[test]
    fn test_verified_bundle_without_certificates_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"empty\n").unwrap();
        let policy = TlsPolicy::Verified {
            ca_bundle: Some(file.path().to_path_buf()),
        };
        let err = RawConnection::connect_tls(
            "127.0.0.1",
            1,
            Deadline::after(Duration::from_secs(1)),
            &policy,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConnectionError::TlsFailed(ref m) if m.contains("Invalid CA bundle")), "{err}");
    }

    // These tests require a running Valkey server
    // They are marked as ignored by default

    #[test]
    #[ignore]
    fn test_tcp_connection() {
        let mut conn = RawConnection::connect_tcp("127.0.0.1", 6379, Deadline::after(Duration::from_secs(5)))
            .expect("Failed to connect");
        assert!(conn.ping().expect("Ping failed"));
    }

    #[test]
    #[ignore]
    fn test_connection_factory() {
        let spec = ConnectionSpec::from_fields(&ConnectionFields {
            host: Some("127.0.0.1".to_string()),
            port: Some("6379".to_string()),
            tls: Some("n".to_string()),
            ..Default::default()
        })
        .unwrap();
        let factory = ConnectionFactory::new(&spec, TlsPolicy::Disabled, Duration::from_secs(5));
        let mut conn = factory
            .create(&spec.host, spec.port)
            .expect("Failed to connect");
        assert!(conn.ping().expect("Ping failed"));
    }
}
