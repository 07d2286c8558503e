//! Certificate loading and TLS configuration.
//!
//! The install server presents one leaf certificate for exactly one subject
//! name. Clients asking for any other name (or none) get no certificate and
//! the handshake fails; there is no default certificate and no wildcard.

use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::ResolvesServerCertUsingSni;
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use tracing::{debug, info};

use super::config::InstallerConfig;
use super::error::{InstallerError, InstallerResult};

/// Key, leaf chain and root CA for one subject name.
///
/// Loaded once and shared read-only.
#[derive(Debug)]
pub struct CertificateBundle {
    server_name: String,
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    root_ca_pem: Vec<u8>,
}

impl CertificateBundle {
    /// Load the three PEM files named by `config`.
    pub fn load(config: &InstallerConfig) -> InstallerResult<Self> {
        let server_name = config.server_name.trim().to_string();
        if server_name.is_empty() || server_name.contains('*') {
            return Err(InstallerError::certificate(
                &config.certificate_dir,
                format!("server name '{}' must be a single exact host name", server_name),
            ));
        }

        let cert_chain = read_certs(&config.cert_path())?;
        let key = read_key(&config.key_path())?;

        let root_ca_path = config.root_ca_path();
        let root_ca_pem = read_file(&root_ca_path)?;
        if read_certs(&root_ca_path)?.is_empty() {
            return Err(InstallerError::certificate(&root_ca_path, "no certificate found"));
        }

        debug!(
            server_name = %server_name,
            chain_len = cert_chain.len(),
            dir = %config.certificate_dir.display(),
            "Loaded certificate bundle"
        );
        Ok(Self {
            server_name,
            cert_chain,
            key,
            root_ca_pem,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// The root CA in PEM form, as handed to devices for trust.
    pub fn root_ca_pem(&self) -> &[u8] {
        &self.root_ca_pem
    }
}

/// Build the server TLS configuration for `bundle`.
pub fn setup_tls(bundle: &CertificateBundle) -> InstallerResult<Arc<ServerConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&bundle.key)?;
    let certified = CertifiedKey::new(bundle.cert_chain.clone(), signing_key);

    // `add` verifies the leaf is valid for the name.
    let mut resolver = ResolvesServerCertUsingSni::new();
    resolver.add(&bundle.server_name, certified)?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(resolver));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    info!(server_name = %bundle.server_name, "TLS configured");
    Ok(Arc::new(config))
}

fn read_file(path: &Path) -> InstallerResult<Vec<u8>> {
    fs::read(path).map_err(|e| InstallerError::certificate(path, e))
}

fn read_certs(path: &Path) -> InstallerResult<Vec<CertificateDer<'static>>> {
    let data = read_file(path)?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(data.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| InstallerError::certificate(path, e))?;
    if certs.is_empty() {
        return Err(InstallerError::certificate(path, "no certificate found"));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> InstallerResult<PrivateKeyDer<'static>> {
    let data = read_file(path)?;
    rustls_pemfile::private_key(&mut BufReader::new(data.as_slice()))
        .map_err(|e| InstallerError::certificate(path, e))?
        .ok_or_else(|| InstallerError::certificate(path, "no private key found"))
}
