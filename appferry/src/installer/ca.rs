//! Plaintext endpoint handing out the root CA certificate.
//!
//! A device must trust the root CA before it can complete a handshake with
//! the install server, so the certificate is offered outside TLS. Only the
//! public certificate is served here.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::InstallerConfig;
use super::error::{InstallerError, InstallerResult};
use super::tls::CertificateBundle;

/// Path the certificate is served under.
pub const ROOT_CA_PATH: &str = "/rootCA.pem";

/// Starts certificate endpoints.
pub struct CaServer;

impl CaServer {
    /// Serve `bundle`'s root CA on the configured CA port.
    pub async fn start(
        config: &InstallerConfig,
        bundle: &CertificateBundle,
    ) -> InstallerResult<RunningCaServer> {
        let addr = SocketAddr::new(config.bind_addr, config.ca_port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| InstallerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let pem: Arc<[u8]> = Arc::from(bundle.root_ca_pem());
        let app = Router::new()
            .route(ROOT_CA_PATH, get(serve_root_ca))
            .with_state(pem);

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                warn!(error = %e, "Certificate endpoint stopped with error");
            }
        });

        let url = format!("http://{}{}", local_addr, ROOT_CA_PATH);
        info!(%url, "Root certificate available");
        Ok(RunningCaServer {
            local_addr,
            url,
            cancel,
            handle: Some(handle),
        })
    }
}

async fn serve_root_ca(State(pem): State<Arc<[u8]>>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/x-pem-file"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"rootCA.pem\""),
        ],
        pem.to_vec(),
    )
}

/// Handle to a running certificate endpoint.
pub struct RunningCaServer {
    local_addr: SocketAddr,
    url: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RunningCaServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Where the certificate can be downloaded.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the endpoint to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Certificate endpoint task ended abnormally");
            }
        }
    }
}

impl Drop for RunningCaServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
