//! Device listing commands.

use appferry::config::ConfigFile;
use appferry::devicectl::{Device, InstalledApp};
use console::style;

use super::common::bridge;
use crate::error::CliError;

/// List paired devices.
pub async fn run_devices(config: &ConfigFile) -> Result<(), CliError> {
    let devices = bridge(config).list_devices().await?;
    print_devices(&devices);
    Ok(())
}

/// List apps installed on a device.
pub async fn run_apps(
    config: &ConfigFile,
    device_id: &str,
    bundle_id: Option<&str>,
) -> Result<(), CliError> {
    let apps = bridge(config).list_apps(device_id, bundle_id).await?;
    print_apps(&apps);
    Ok(())
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("No paired devices found.");
        return;
    }
    for device in devices {
        println!(
            "{}  {}",
            style(&device.name).bold(),
            style(&device.id).dim()
        );
        println!(
            "    {} ({}), OS {} ({})",
            device.model, device.device_type, device.os_version, device.os_build
        );
        if let Some(seen) = device.last_connection {
            println!("    last connected {}", seen.format("%Y-%m-%d %H:%M UTC"));
        }
    }
}

fn print_apps(apps: &[InstalledApp]) {
    if apps.is_empty() {
        println!("No apps found.");
        return;
    }
    for app in apps {
        let mut flags = Vec::new();
        if app.app_clip {
            flags.push("app clip");
        }
        if app.default_app {
            flags.push("default");
        }
        if app.hidden {
            flags.push("hidden");
        }
        if app.internal_app {
            flags.push("internal");
        }
        if !app.removable {
            flags.push("not removable");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "{:<40}  {} {} ({}){}",
            app.id(),
            style(&app.name).bold(),
            app.version,
            app.bundle_version,
            flags
        );
    }
}
