//! Over-the-air install and root certificate commands.

use appferry::config::ConfigFile;
use appferry::installer::{CaServer, CertificateBundle};
use console::style;

use super::common::{open_manager, ota_pipeline, resolve_id, wait_for_interrupt};
use crate::error::CliError;

/// Run `serve <manifest>`: offer a finished download to devices until Ctrl-C.
pub async fn run_serve(config: &ConfigFile, manifest: &str, with_ca: bool) -> Result<(), CliError> {
    let manager = open_manager(config)?;
    let id = resolve_id(&manager, manifest)?;
    let (pipeline, bundle) = ota_pipeline(config, manager)?;

    let ca = if with_ca {
        Some(CaServer::start(&config.installer, &bundle).await?)
    } else {
        None
    };
    let server = pipeline.serve_over_the_air(&id).await?;

    println!("Serving {} for over-the-air install.", style(&id).bold());
    if let Some(ca) = &ca {
        println!();
        println!("1. Trust the root certificate on the device (once):");
        println!("   {}", style(ca.url()).cyan());
        println!();
        println!("2. Open this link on the device to install:");
    } else {
        println!("Open this link on the device to install:");
    }
    println!("   {}", style(server.itms_services_url()).cyan());
    println!();
    println!("Press Ctrl-C to stop.");

    // The server stops by itself only after a failed handshake.
    tokio::select! {
        _ = wait_for_interrupt() => server.shutdown(),
        _ = server.stopped() => {}
    }
    let result = server.wait().await;

    if let Some(ca) = ca {
        ca.stop().await;
    }
    result?;
    println!("Stopped.");
    Ok(())
}

/// Run `certificate`: serve the root CA until Ctrl-C.
pub async fn run_certificate(config: &ConfigFile) -> Result<(), CliError> {
    let bundle = CertificateBundle::load(&config.installer)?;
    let ca = CaServer::start(&config.installer, &bundle).await?;

    println!("Root certificate for {}:", style(bundle.server_name()).bold());
    println!("   file: {}", config.installer.root_ca_path().display());
    println!("   url:  {}", style(ca.url()).cyan());
    println!();
    println!("Open the URL on the device, install the profile, then enable full trust");
    println!("under Settings > General > About > Certificate Trust Settings.");
    println!();
    println!("Press Ctrl-C to stop.");

    wait_for_interrupt().await;
    ca.stop().await;
    Ok(())
}
