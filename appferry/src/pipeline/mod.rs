//! Install pipeline.
//!
//! Hands a completed download to a device, either by pushing it through the
//! device bridge or by serving it over the air.

use std::path::PathBuf;
use std::sync::Arc;

use rustls::ServerConfig;
use thiserror::Error;
use tracing::info;

use crate::devicectl::{BridgeError, DeviceBridge};
use crate::installer::{
    InstallServer, InstallSession, InstallerConfig, InstallerError, RunningInstallServer,
};
use crate::manager::{DownloadManager, ManagerError};
use crate::package::{DownloadStatus, PackageManifest};

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors from handing a download to a device.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The manifest has not finished downloading.
    #[error("download {id} is {status}, not completed")]
    NotCompleted { id: String, status: DownloadStatus },

    /// No install server was configured for over-the-air installs.
    #[error("over-the-air install is not configured")]
    NoInstallServer,

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Installer(#[from] InstallerError),
}

/// Connects finished downloads to the two install paths.
pub struct InstallPipeline {
    manager: DownloadManager,
    bridge: Arc<dyn DeviceBridge>,
    install_server: Option<(InstallerConfig, Arc<ServerConfig>)>,
}

impl InstallPipeline {
    /// Pipeline that installs through `bridge` only.
    pub fn new(manager: DownloadManager, bridge: Arc<dyn DeviceBridge>) -> Self {
        Self {
            manager,
            bridge,
            install_server: None,
        }
    }

    /// Enable over-the-air installs with `config` and `tls`.
    pub fn with_install_server(mut self, config: InstallerConfig, tls: Arc<ServerConfig>) -> Self {
        self.install_server = Some((config, tls));
        self
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    pub fn bridge(&self) -> &dyn DeviceBridge {
        self.bridge.as_ref()
    }

    /// Push the artifact of manifest `id` onto `device_id` through the bridge.
    pub async fn install_to_device(&self, id: &str, device_id: &str) -> PipelineResult<()> {
        let (manifest, artifact) = self.completed(id)?;
        let bundle_id = &manifest.package.software.bundle_id;
        info!(id, device_id, %bundle_id, "Installing onto device");
        self.bridge.install(&artifact, device_id).await?;
        info!(id, device_id, %bundle_id, "Installed onto device");
        Ok(())
    }

    /// Start an install server offering the artifact of manifest `id`.
    pub async fn serve_over_the_air(&self, id: &str) -> PipelineResult<RunningInstallServer> {
        let (config, tls) = self
            .install_server
            .as_ref()
            .ok_or(PipelineError::NoInstallServer)?;
        let (manifest, artifact) = self.completed(id)?;
        let session = InstallSession::new(manifest, artifact);
        let server = InstallServer::start(config, Arc::clone(tls), session).await?;
        Ok(server)
    }

    /// The manifest `id` and its artifact, if it has completed.
    fn completed(&self, id: &str) -> PipelineResult<(PackageManifest, PathBuf)> {
        let manifest = self
            .manager
            .get(id)
            .ok_or_else(|| ManagerError::NotFound { id: id.to_string() })?;
        match self.manager.artifact_path(id) {
            Some(path) => Ok((manifest, path)),
            None => Err(PipelineError::NotCompleted {
                id: id.to_string(),
                status: manifest.status(),
            }),
        }
    }
}
