//! Connection specification
//!
//! Raw fields arrive as optional strings from either the interactive prompt
//! or an environment section of the config file. They are validated and
//! defaulted exactly once here; everything downstream works with the typed
//! [`ConnectionSpec`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use super::tls_config::TlsConfig;
use crate::utils::ValidationError;

/// Port used when none is given (the usual TLS port for managed services)
pub const DEFAULT_PORT: u16 = 6380;

/// Database index used when none is given
pub const DEFAULT_DB: u32 = 0;

/// Accepted spellings for boolean fields, compared case-insensitively
const TRUE_VALUES: &[&str] = &["1", "true", "y", "yes", "on"];
const FALSE_VALUES: &[&str] = &["0", "false", "n", "no", "off"];

/// Parse a boolean field using the shared accepted-values table
///
/// Empty or absent input yields `default`.
pub fn parse_flag(
    field: &'static str,
    raw: Option<&str>,
    default: bool,
) -> Result<bool, ValidationError> {
    let value = match raw.map(str::trim) {
        None | Some("") => return Ok(default),
        Some(v) => v.to_ascii_lowercase(),
    };

    if TRUE_VALUES.contains(&value.as_str()) {
        Ok(true)
    } else if FALSE_VALUES.contains(&value.as_str()) {
        Ok(false)
    } else {
        Err(ValidationError::InvalidFlag {
            field,
            value: raw.unwrap_or_default().to_string(),
        })
    }
}

/// Unvalidated connection fields, named after the config file keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionFields {
    pub host: Option<String>,
    pub port: Option<String>,
    pub db: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: Option<String>,
    pub tls_verify: Option<String>,
    pub tls_ca_certs_path: Option<String>,
    pub legacymode: Option<String>,
}

impl ConnectionFields {
    /// Pick the known keys out of a config section; unknown keys are ignored
    pub fn from_section(section: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| section.get(key).cloned();
        Self {
            host: get("host"),
            port: get("port"),
            db: get("db"),
            username: get("username"),
            password: get("password"),
            tls: get("tls"),
            tls_verify: get("tls_verify"),
            tls_ca_certs_path: get("tls_ca_certs_path"),
            legacymode: get("legacymode"),
        }
    }
}

/// Validated connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: TlsConfig,
    /// Speak RESP2 instead of negotiating RESP3
    pub legacy_protocol: bool,
}

impl ConnectionSpec {
    /// Validate raw fields and apply defaults
    pub fn from_fields(fields: &ConnectionFields) -> Result<Self, ValidationError> {
        let host = fields.host.as_deref().map(str::trim).unwrap_or_default();
        if host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }

        let port = match non_empty(&fields.port) {
            None => DEFAULT_PORT,
            Some(raw) => match raw.parse::<u16>() {
                Ok(p) if p > 0 => p,
                _ => return Err(ValidationError::InvalidPort(raw.to_string())),
            },
        };

        let db = match non_empty(&fields.db) {
            None => DEFAULT_DB,
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ValidationError::InvalidDb(raw.to_string()))?,
        };

        // Passwords are taken verbatim; only a completely empty one means "no auth"
        let password = fields.password.clone().filter(|p| !p.is_empty());
        let username = non_empty(&fields.username).map(str::to_string);

        let tls_enabled = parse_flag("tls", fields.tls.as_deref(), true)?;
        let tls = if tls_enabled {
            let verify = parse_flag("tls_verify", fields.tls_verify.as_deref(), true)?;
            let ca_cert = non_empty(&fields.tls_ca_certs_path).map(PathBuf::from);
            if !verify && ca_cert.is_some() {
                debug!("Ignoring tls_ca_certs_path: certificate verification is disabled");
            }
            TlsConfig {
                enabled: true,
                verify,
                ca_cert: if verify { ca_cert } else { None },
            }
        } else {
            TlsConfig::disabled()
        };

        let legacy_protocol = parse_flag("legacymode", fields.legacymode.as_deref(), false)?;

        Ok(Self {
            host: host.to_string(),
            port,
            db,
            username,
            password,
            tls,
            legacy_protocol,
        })
    }

    /// Protocol version requested from the server
    pub fn protocol_version(&self) -> u8 {
        if self.legacy_protocol {
            2
        } else {
            3
        }
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if self.db != 0 {
            write!(f, "/{}", self.db)?;
        }
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
