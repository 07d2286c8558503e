//! Error types for the install server.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for install server operations.
pub type InstallerResult<T> = Result<T, InstallerError>;

/// Errors from the OTA install server and its certificate handling.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// A certificate or key could not be loaded.
    #[error("failed to load certificate material from {}: {reason}", path.display())]
    CertificateLoad { path: PathBuf, reason: String },

    /// The certificate material was rejected when building the TLS configuration.
    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    /// A client failed the TLS handshake; the server instance has stopped.
    #[error("TLS handshake with {peer} failed: {reason}; make sure the root certificate is installed and trusted on the device")]
    TlsHandshake { peer: SocketAddr, reason: String },

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The artifact to serve does not exist.
    #[error("artifact not found: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    /// Any other I/O failure.
    #[error("install server I/O error: {0}")]
    Io(#[from] io::Error),
}

impl InstallerError {
    pub(crate) fn certificate(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CertificateLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether trusting the root certificate on the device would likely fix this.
    pub fn needs_trust(&self) -> bool {
        matches!(self, Self::TlsHandshake { .. })
    }
}
