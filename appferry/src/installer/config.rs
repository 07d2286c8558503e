//! Configuration for the install server.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

/// Subject name the bundled certificate is issued for.
///
/// Resolves to the loopback address, so the device reaches the host through
/// its tunnel while still validating a real hostname.
pub const DEFAULT_SERVER_NAME: &str = "app.localhost.qaq.wiki";

/// Configuration for the install server and the certificate endpoint.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Directory holding the PEM files.
    pub certificate_dir: PathBuf,

    /// File name of the server private key.
    pub key_file: String,

    /// File name of the leaf certificate (chain).
    pub cert_file: String,

    /// File name of the root CA certificate.
    pub root_ca_file: String,

    /// The single name the TLS endpoint answers for.
    pub server_name: String,

    /// Address to listen on.
    pub bind_addr: IpAddr,

    /// TLS port; `0` picks a free port.
    pub port: u16,

    /// Plaintext certificate endpoint port; `0` picks a free port.
    pub ca_port: u16,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            certificate_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".appferry")
                .join("certificates"),
            key_file: "server-key.pem".to_string(),
            cert_file: "server-cert.pem".to_string(),
            root_ca_file: "root-ca.pem".to_string(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ca_port: 0,
        }
    }
}

impl InstallerConfig {
    /// Create a configuration reading certificates from `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            certificate_dir: dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_ca_port(mut self, port: u16) -> Self {
        self.ca_port = port;
        self
    }

    pub fn key_path(&self) -> PathBuf {
        self.certificate_dir.join(&self.key_file)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.certificate_dir.join(&self.cert_file)
    }

    pub fn root_ca_path(&self) -> PathBuf {
        self.certificate_dir.join(&self.root_ca_file)
    }
}
