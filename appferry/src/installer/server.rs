//! TLS install server.
//!
//! ```text
//! device ──TLS (SNI = server name)──► accept loop ──► per-connection task
//!                                                         │
//!                                        hyper auto (h1/h2) + axum router
//!                                          ├── /<token>/manifest.plist
//!                                          └── /<token>/package.ipa  (ranged)
//! ```
//!
//! Each server instance serves one session: one artifact behind a random
//! path token. A failed TLS handshake stops the instance and is reported by
//! [`RunningInstallServer::wait`]; there is no plaintext fallback.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use parking_lot::Mutex;
use rand::RngCore;
use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::config::InstallerConfig;
use super::error::{InstallerError, InstallerResult};
use super::manifest::{itms_services_url, InstallManifest};
use crate::package::PackageManifest;

/// Content type of the install manifest.
const PLIST_CONTENT_TYPE: &str = "application/xml";

/// Random bytes in a session token (hex-encoded to twice this length).
const TOKEN_BYTES: usize = 12;

/// One artifact offered to devices.
#[derive(Debug, Clone)]
pub struct InstallSession {
    token: String,
    artifact: PathBuf,
    manifest: PackageManifest,
}

impl InstallSession {
    /// Offer the completed `manifest` whose artifact lives at `artifact`.
    pub fn new(manifest: PackageManifest, artifact: PathBuf) -> Self {
        Self {
            token: session_token(),
            artifact,
            manifest,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn artifact(&self) -> &std::path::Path {
        &self.artifact
    }
}

/// Random path segment for a session.
fn session_token() -> String {
    let mut token = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut token);
    hex::encode(token)
}

struct SessionState {
    plist: Bytes,
}

/// Starts install servers.
pub struct InstallServer;

impl InstallServer {
    /// Bind and start serving `session` over `tls`.
    pub async fn start(
        config: &InstallerConfig,
        tls: Arc<ServerConfig>,
        session: InstallSession,
    ) -> InstallerResult<RunningInstallServer> {
        if !tokio::fs::try_exists(&session.artifact).await.unwrap_or(false) {
            return Err(InstallerError::ArtifactMissing {
                path: session.artifact.clone(),
            });
        }

        let addr = SocketAddr::new(config.bind_addr, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| InstallerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let base_url = format!(
            "https://{}:{}/{}",
            config.server_name,
            local_addr.port(),
            session.token
        );
        let package_url = format!("{}/package.ipa", base_url);
        let plist = InstallManifest::for_package(&session.manifest, &package_url).to_plist();

        let app = Router::new()
            .route(
                &format!("/{}/manifest.plist", session.token),
                get(serve_manifest),
            )
            .route_service(
                &format!("/{}/package.ipa", session.token),
                ServeFile::new(&session.artifact),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(SessionState {
                plist: Bytes::from(plist),
            }));

        let cancel = CancellationToken::new();
        let failure = Arc::new(Mutex::new(None));
        let handle = tokio::spawn(accept_loop(
            listener,
            TlsAcceptor::from(tls),
            app,
            cancel.clone(),
            Arc::clone(&failure),
        ));

        info!(
            %local_addr,
            id = %session.manifest.id,
            bundle_id = %session.manifest.package.software.bundle_id,
            "Install server listening"
        );
        Ok(RunningInstallServer {
            local_addr,
            manifest_url: format!("{}/manifest.plist", base_url),
            package_url,
            cancel,
            failure,
            handle: Some(handle),
        })
    }
}

async fn serve_manifest(State(state): State<Arc<SessionState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PLIST_CONTENT_TYPE)], state.plist.clone())
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    cancel: CancellationToken,
    failure: Arc<Mutex<Option<InstallerError>>>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
        };
        debug!(%peer, "Accepted connection");
        tokio::spawn(serve_connection(
            stream,
            peer,
            acceptor.clone(),
            app.clone(),
            cancel.clone(),
            Arc::clone(&failure),
        ));
    }
    debug!("Install server accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
    cancel: CancellationToken,
    failure: Arc<Mutex<Option<InstallerError>>>,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(tls_stream) => tls_stream,
        Err(e) => {
            error!(%peer, error = %e, "TLS handshake failed, stopping install server");
            failure
                .lock()
                .get_or_insert(InstallerError::TlsHandshake {
                    peer,
                    reason: e.to_string(),
                });
            cancel.cancel();
            return;
        }
    };

    let builder = auto::Builder::new(TokioExecutor::new());
    let connection =
        builder.serve_connection(TokioIo::new(tls_stream), TowerToHyperService::new(app));
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(e) = result {
                debug!(%peer, error = %e, "Connection closed with error");
            }
        }
        _ = cancel.cancelled() => {
            debug!(%peer, "Dropping connection on shutdown");
        }
    }
}

/// Handle to a running install server.
pub struct RunningInstallServer {
    local_addr: SocketAddr,
    manifest_url: String,
    package_url: String,
    cancel: CancellationToken,
    failure: Arc<Mutex<Option<InstallerError>>>,
    handle: Option<JoinHandle<()>>,
}

impl RunningInstallServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    pub fn package_url(&self) -> &str {
        &self.package_url
    }

    /// The link to open on the device to start installing.
    pub fn itms_services_url(&self) -> String {
        itms_services_url(&self.manifest_url)
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Resolves once the server has been shut down or has failed.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }

    /// Stop accepting connections and close open ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the server to stop.
    ///
    /// Returns the handshake failure that stopped it, if any.
    pub async fn wait(mut self) -> InstallerResult<()> {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Install server task ended abnormally");
            }
        }
        match self.failure.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for RunningInstallServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{AccountRef, DownloadTicket, PackageDescriptor, Software};

    fn manifest() -> PackageManifest {
        PackageManifest::new(
            AccountRef::new("acct", "a@example.com"),
            PackageDescriptor::new(Software::new("com.example.app", "Example", "1.0"), "1"),
            DownloadTicket::new("https://example.com/a.ipa"),
        )
    }

    #[test]
    fn test_session_tokens_are_random_hex() {
        let a = InstallSession::new(manifest(), PathBuf::from("/a.ipa"));
        let b = InstallSession::new(manifest(), PathBuf::from("/a.ipa"));
        assert_eq!(a.token().len(), TOKEN_BYTES * 2);
        assert!(a.token().chars().all(|c| c.is_ascii_hexdigit()));
        // Same package, same instant: only entropy separates the two.
        assert_ne!(a.token(), b.token());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_rejected() {
        let bundle = crate::installer::CertificateBundle::load(&InstallerConfig::new(
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/certs"),
        ))
        .unwrap();
        let tls = crate::installer::setup_tls(&bundle).unwrap();
        let session = InstallSession::new(manifest(), PathBuf::from("/nonexistent/a.ipa"));

        let result = InstallServer::start(&InstallerConfig::default(), tls, session).await;
        assert!(matches!(result, Err(InstallerError::ArtifactMissing { .. })));
    }
}
