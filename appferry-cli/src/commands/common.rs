//! Shared helpers for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use appferry::config::ConfigFile;
use appferry::devicectl::{default_bridge, DeviceBridge};
use appferry::installer::{setup_tls, CertificateBundle};
use appferry::manager::{
    DownloadManager, FileManifestStore, HttpTransfer, ManagerError, ManifestEvent,
};
use appferry::package::PackageManifest;
use appferry::pipeline::InstallPipeline;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::CliError;

/// Progress bar resolution; percent is scaled to this many steps.
const BAR_STEPS: u64 = 1000;

/// Open the download manager over the configured directories.
pub fn open_manager(config: &ConfigFile) -> Result<DownloadManager, CliError> {
    let downloads = config.downloads.clone();
    let store = FileManifestStore::open(&downloads.state_dir).map_err(ManagerError::from)?;
    let transfer = HttpTransfer::with_timeout(downloads.timeout)?;
    Ok(DownloadManager::open(
        downloads,
        Arc::new(store),
        Arc::new(transfer),
    )?)
}

/// The device bridge for this host.
pub fn bridge(config: &ConfigFile) -> Arc<dyn DeviceBridge> {
    default_bridge(config.devicectl.clone())
}

/// Pipeline with over-the-air installs enabled.
pub fn ota_pipeline(
    config: &ConfigFile,
    manager: DownloadManager,
) -> Result<(InstallPipeline, CertificateBundle), CliError> {
    let bundle = CertificateBundle::load(&config.installer)?;
    let tls = setup_tls(&bundle)?;
    let pipeline = InstallPipeline::new(manager, bridge(config))
        .with_install_server(config.installer.clone(), tls);
    Ok((pipeline, bundle))
}

/// Resolve a full manifest id from an id or unique prefix.
pub fn resolve_id(manager: &DownloadManager, needle: &str) -> Result<String, CliError> {
    if manager.get(needle).is_some() {
        return Ok(needle.to_string());
    }
    let matches: Vec<String> = manager
        .list()
        .into_iter()
        .filter(|m| m.id.starts_with(needle))
        .map(|m| m.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(id.clone()),
        [] => Err(CliError::UnknownManifest(format!(
            "no download matches '{}'",
            needle
        ))),
        _ => Err(CliError::UnknownManifest(format!(
            "'{}' matches {} downloads; use a longer id",
            needle,
            matches.len()
        ))),
    }
}

/// Short form of a manifest id for tables.
pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Show progress for `id` until it completes, fails or is interrupted.
///
/// Ctrl-C suspends every running download before returning.
pub async fn follow(manager: &DownloadManager, id: &str) -> Result<PackageManifest, CliError> {
    let bar = ProgressBar::new(BAR_STEPS);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    if let Some(current) = manager.get(id) {
        update_bar(&bar, &current);
    }

    let mut events = manager.subscribe();
    let settled = manager.wait_until_settled(id);
    tokio::pin!(settled);

    loop {
        tokio::select! {
            result = &mut settled => {
                bar.finish_and_clear();
                return Ok(result?);
            }
            event = events.recv() => {
                if let Ok(ManifestEvent::Updated(manifest)) = event {
                    if manifest.id == id {
                        update_bar(&bar, &manifest);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                bar.abandon_with_message("Interrupted, pausing downloads...");
                manager.shutdown().await;
                return Err(CliError::Interrupted);
            }
        }
    }
}

fn update_bar(bar: &ProgressBar, manifest: &PackageManifest) {
    bar.set_position((manifest.state.percent * BAR_STEPS as f64) as u64);
    bar.set_message(format!(
        "{} {}",
        style(&manifest.package.software.name).bold(),
        manifest.hint()
    ));
}

/// Wait for Ctrl-C.
pub async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
