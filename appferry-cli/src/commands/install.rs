//! Install a finished download onto a device through the device tool.

use appferry::config::ConfigFile;
use appferry::pipeline::InstallPipeline;
use console::style;
use indicatif::ProgressBar;
use std::time::Duration;

use super::common::{bridge, open_manager, resolve_id};
use crate::error::CliError;

/// Run `install <manifest> <device>`.
pub async fn run(config: &ConfigFile, manifest: &str, device_id: &str) -> Result<(), CliError> {
    let manager = open_manager(config)?;
    let id = resolve_id(&manager, manifest)?;
    let name = manager
        .get(&id)
        .map(|m| m.package.software.name)
        .unwrap_or_default();
    let pipeline = InstallPipeline::new(manager, bridge(config));

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Installing {} onto {}...", name, device_id));
    spinner.enable_steady_tick(Duration::from_millis(120));
    let result = pipeline.install_to_device(&id, device_id).await;
    spinner.finish_and_clear();
    result?;

    println!("{} Installed {} onto {}", style("✓").green(), name, device_id);
    Ok(())
}
