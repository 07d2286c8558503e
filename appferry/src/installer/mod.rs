//! Over-the-air install server.
//!
//! Serves a completed package and its install manifest to a device over TLS.
//! The device trusts the endpoint through a pinned root CA, which it fetches
//! from the plaintext [`CaServer`] beforehand.
//!
//! ```text
//! CertificateBundle::load ──► setup_tls ──► Arc<ServerConfig>
//!                                               │
//! InstallSession (manifest + artifact) ──► InstallServer::start ──► RunningInstallServer
//!                                                                     └── itms_services_url()
//! ```

mod ca;
mod config;
mod error;
mod manifest;
mod server;
mod tls;

pub use ca::{CaServer, RunningCaServer, ROOT_CA_PATH};
pub use config::{InstallerConfig, DEFAULT_SERVER_NAME};
pub use error::{InstallerError, InstallerResult};
pub use manifest::{itms_services_url, InstallManifest};
pub use server::{InstallServer, InstallSession, RunningInstallServer};
pub use tls::{setup_tls, CertificateBundle};
