//! TLS configuration and policy resolution

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::connection_spec::ConnectionSpec;

/// Well-known system CA bundle locations, checked in order
const SYSTEM_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem",
    "/etc/ssl/cert.pem",
    "/usr/local/etc/openssl/cert.pem",
    "/opt/homebrew/etc/openssl@3/cert.pem",
];

/// TLS intent as written by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub enabled: bool,
    /// Only meaningful when `enabled`
    pub verify: bool,
    /// Only meaningful when `enabled && verify`
    pub ca_cert: Option<PathBuf>,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            verify: false,
            ca_cert: None,
        }
    }
}

/// How the transport will actually be secured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Plain TCP
    Disabled,
    /// TLS with peer verification against `ca_bundle` (or the backend's roots)
    Verified { ca_bundle: Option<PathBuf> },
    /// TLS without certificate or hostname verification
    Unverified,
}

impl TlsPolicy {
    /// Resolve the policy for a connection, falling back to the system bundle
    pub fn resolve(spec: &ConnectionSpec) -> Self {
        Self::resolve_with(spec, default_trust_bundle)
    }

    /// Resolve with an explicit fallback trust bundle lookup
    pub fn resolve_with<F>(spec: &ConnectionSpec, fallback_bundle: F) -> Self
    where
        F: FnOnce() -> Option<PathBuf>,
    {
        let tls = &spec.tls;
        if !tls.enabled {
            return TlsPolicy::Disabled;
        }

        if !tls.verify {
            warn!(
                "TLS certificate verification is DISABLED for {}:{}. This is insecure.",
                spec.host, spec.port
            );
            return TlsPolicy::Unverified;
        }

        if let Some(ref ca_path) = tls.ca_cert {
            if ca_path.is_file() {
                debug!("Using custom CA bundle {}", ca_path.display());
                return TlsPolicy::Verified {
                    ca_bundle: Some(ca_path.clone()),
                };
            }
            warn!(
                "CA bundle {} not found, falling back to the default trust store",
                ca_path.display()
            );
        }

        let ca_bundle = fallback_bundle();
        match ca_bundle {
            Some(ref path) => debug!("Using default CA bundle {}", path.display()),
            None => debug!("No CA bundle file found, using the TLS backend's root store"),
        }
        TlsPolicy::Verified { ca_bundle }
    }

    pub fn use_tls(&self) -> bool {
        !matches!(self, TlsPolicy::Disabled)
    }

    pub fn verify(&self) -> bool {
        matches!(self, TlsPolicy::Verified { .. })
    }

    pub fn ca_bundle_path(&self) -> Option<&Path> {
        match self {
            TlsPolicy::Verified { ca_bundle } => ca_bundle.as_deref(),
            _ => None,
        }
    }
}

/// Locate the default trust bundle
///
/// `SSL_CERT_FILE` wins when it names an existing file, otherwise the first
/// existing well-known system location.
pub fn default_trust_bundle() -> Option<PathBuf> {
    env::var_os("SSL_CERT_FILE")
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .or_else(|| {
            SYSTEM_BUNDLE_PATHS
                .iter()
                .map(|p| PathBuf::from(*p))
                .find(|p| p.is_file())
        })
}
