//! AppFerry CLI - Command-line interface
//!
//! Downloads packages, keeps them across restarts and installs them onto
//! paired devices, either through the device tool or over the air.

mod commands;
mod error;

use std::path::PathBuf;

use appferry::config::ConfigFile;
use appferry::logging;
use clap::{ArgAction, Parser, Subcommand};
use console::style;

use commands::downloads::DownloadsCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "appferry", version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.appferry/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage downloads
    Downloads {
        #[command(subcommand)]
        command: DownloadsCommands,
    },

    /// List paired devices
    Devices,

    /// List apps installed on a device
    Apps {
        /// Device identifier
        device: String,

        /// Only show this bundle identifier
        #[arg(long)]
        bundle_id: Option<String>,
    },

    /// Install a finished download onto a device through the device tool
    Install {
        /// Download id (or unique prefix)
        manifest: String,

        /// Device identifier
        device: String,
    },

    /// Offer a finished download for over-the-air install
    Serve {
        /// Download id (or unique prefix)
        manifest: String,

        /// TLS port (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Root certificate port (overrides config)
        #[arg(long)]
        ca_port: Option<u16>,

        /// Do not serve the root certificate
        #[arg(long)]
        no_ca: bool,
    },

    /// Serve the root certificate so devices can trust the install server
    Certificate {
        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            if let Some(hint) = e.guidance() {
                eprintln!("{} {}", style("hint:").yellow().bold(), hint);
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    let _logging = logging::init(&config.logging);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "appferry starting");

    match cli.command {
        Commands::Downloads { command } => commands::downloads::run(command, &config).await,
        Commands::Devices => commands::devices::run_devices(&config).await,
        Commands::Apps { device, bundle_id } => {
            commands::devices::run_apps(&config, &device, bundle_id.as_deref()).await
        }
        Commands::Install { manifest, device } => {
            commands::install::run(&config, &manifest, &device).await
        }
        Commands::Serve {
            manifest,
            port,
            ca_port,
            no_ca,
        } => {
            if let Some(port) = port {
                config.installer.port = port;
            }
            if let Some(port) = ca_port {
                config.installer.ca_port = port;
            }
            commands::serve::run_serve(&config, &manifest, !no_ca).await
        }
        Commands::Certificate { port } => {
            if let Some(port) = port {
                config.installer.ca_port = port;
            }
            commands::serve::run_certificate(&config).await
        }
    }
}
