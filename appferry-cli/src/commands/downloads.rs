//! Download management commands.

use appferry::config::ConfigFile;
use appferry::manager::{available_actions, DirectLinkCatalog, DownloadAction, DownloadManager};
use appferry::package::{
    AccountRef, DownloadStatus, DownloadTicket, PackageDescriptor, PackageManifest, RangeSupport,
    Software,
};
use clap::{Args, Subcommand};
use console::style;
use dialoguer::Confirm;

use super::common::{follow, open_manager, resolve_id, short_id};
use crate::error::CliError;

/// Download subcommands.
#[derive(Debug, Subcommand)]
pub enum DownloadsCommands {
    /// List all downloads
    List {
        /// Show full ids, accounts and available actions
        #[arg(short = 'l', long = "long")]
        detailed: bool,
    },

    /// Add a download from a known package URL and start it
    Add(AddArgs),

    /// Resume a pending, paused or failed download
    Resume {
        /// Download id (or unique prefix)
        id: String,
        /// Do not wait for the download; it is left paused
        #[arg(long)]
        detach: bool,
    },

    /// Pause a running download, keeping the bytes received so far
    Suspend {
        /// Download id (or unique prefix)
        id: String,
    },

    /// Discard partial data and start the download over
    Restart {
        /// Download id (or unique prefix)
        id: String,
        /// Do not wait for the download; it is left paused
        #[arg(long)]
        detach: bool,
    },

    /// Delete a download and its files
    Delete {
        /// Download id (or unique prefix)
        id: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete every download
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for `downloads add`.
#[derive(Debug, Args)]
pub struct AddArgs {
    /// URL of the package
    #[arg(long)]
    pub url: String,

    /// Bundle identifier, e.g. com.example.app
    #[arg(long)]
    pub bundle_id: String,

    /// Display name
    #[arg(long)]
    pub name: String,

    /// Version string shown to the user
    #[arg(long = "app-version")]
    pub app_version: String,

    /// Catalog version identifier (defaults to the version string)
    #[arg(long)]
    pub version_id: Option<String>,

    /// Expected SHA-256 of the package
    #[arg(long)]
    pub sha256: Option<String>,

    /// Artwork URL shown while installing over the air
    #[arg(long)]
    pub artwork_url: Option<String>,

    /// Whether the server honours ranged requests
    #[arg(long, value_enum, default_value = "probe")]
    pub ranges: RangesArg,

    /// Account the download belongs to
    #[arg(long, default_value = "local")]
    pub account: String,

    /// Account email
    #[arg(long, default_value = "")]
    pub email: String,

    /// Register the download without starting it
    #[arg(long)]
    pub no_start: bool,

    /// Do not wait for the download; it is left paused
    #[arg(long)]
    pub detach: bool,
}

/// Ranged transfer capability for CLI arguments.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum RangesArg {
    /// Resume partial downloads
    Supported,
    /// Always start from the beginning
    Unsupported,
    /// Ask the server before each transfer
    Probe,
}

impl From<RangesArg> for RangeSupport {
    fn from(arg: RangesArg) -> Self {
        match arg {
            RangesArg::Supported => RangeSupport::Supported,
            RangesArg::Unsupported => RangeSupport::Unsupported,
            RangesArg::Probe => RangeSupport::Probe,
        }
    }
}

/// Run a downloads subcommand.
pub async fn run(command: DownloadsCommands, config: &ConfigFile) -> Result<(), CliError> {
    let manager = open_manager(config)?;
    let result = dispatch(&manager, command).await;
    // Transfers live only as long as this process; record them as paused.
    manager.shutdown().await;
    result
}

async fn dispatch(manager: &DownloadManager, command: DownloadsCommands) -> Result<(), CliError> {
    match command {
        DownloadsCommands::List { detailed } => {
            print_list(&manager.list(), detailed);
            Ok(())
        }
        DownloadsCommands::Add(args) => run_add(manager, args).await,
        DownloadsCommands::Resume { id, detach } => {
            let id = resolve_id(manager, &id)?;
            act(manager, &id, DownloadAction::Resume, detach).await
        }
        DownloadsCommands::Suspend { id } => {
            let id = resolve_id(manager, &id)?;
            act(manager, &id, DownloadAction::Suspend, true).await
        }
        DownloadsCommands::Restart { id, detach } => {
            let id = resolve_id(manager, &id)?;
            act(manager, &id, DownloadAction::Restart, detach).await
        }
        DownloadsCommands::Delete { id, yes } => {
            let id = resolve_id(manager, &id)?;
            if !yes && !confirm(&format!("Delete download {}?", short_id(&id)))? {
                println!("Cancelled.");
                return Ok(());
            }
            act(manager, &id, DownloadAction::Delete, true).await
        }
        DownloadsCommands::Clear { yes } => {
            let count = manager.list().len();
            if count == 0 {
                println!("No downloads.");
                return Ok(());
            }
            if !yes && !confirm(&format!("Delete all {} downloads and their files?", count))? {
                println!("Cancelled.");
                return Ok(());
            }
            manager.remove_all().await?;
            println!("Deleted {} downloads.", count);
            Ok(())
        }
    }
}

async fn run_add(manager: &DownloadManager, args: AddArgs) -> Result<(), CliError> {
    let mut software = Software::new(args.bundle_id, args.name, args.app_version.clone());
    if let Some(url) = args.artwork_url {
        software = software.with_artwork_url(url);
    }
    let package = PackageDescriptor::new(software, args.version_id.unwrap_or(args.app_version));
    let account = AccountRef::new(args.account, args.email);

    let mut ticket = DownloadTicket::new(args.url).with_range_support(args.ranges.into());
    if let Some(sha256) = args.sha256 {
        ticket = ticket.with_sha256(sha256);
    }

    let manifest = if args.no_start {
        manager.add(account, package, ticket).await?
    } else {
        let catalog = DirectLinkCatalog::single(&package, ticket);
        manager.start_download(&catalog, account, package).await?
    };
    println!(
        "Added {} {} ({})",
        style(&manifest.package.software.name).bold(),
        manifest.package.software.version,
        manifest.id
    );

    if args.no_start || args.detach {
        return Ok(());
    }
    report(&follow(manager, &manifest.id).await?);
    Ok(())
}

/// Perform `action` on `id`, following progress when it starts a transfer.
async fn act(
    manager: &DownloadManager,
    id: &str,
    action: DownloadAction,
    detach: bool,
) -> Result<(), CliError> {
    match manager.perform(id, action).await? {
        None => println!("Deleted {}.", short_id(id)),
        Some(manifest) if !detach && manifest.status() == DownloadStatus::Downloading => {
            report(&follow(manager, id).await?);
        }
        Some(manifest) => println!("{}: {}", short_id(id), manifest.hint()),
    }
    Ok(())
}

fn report(manifest: &PackageManifest) {
    println!(
        "{} {} {}",
        style("✓").green(),
        manifest.package.software.name,
        manifest.hint()
    );
}

fn confirm(prompt: &str) -> Result<bool, CliError> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| CliError::Config(format!("Failed to read confirmation: {}", e)))
}

fn print_list(manifests: &[PackageManifest], detailed: bool) {
    if manifests.is_empty() {
        println!("No downloads.");
        return;
    }

    println!(
        "{:<12}  {:<28}  {:<10}  {:<12}  {}",
        style("ID").bold(),
        style("NAME").bold(),
        style("VERSION").bold(),
        style("STATUS").bold(),
        style("PROGRESS").bold()
    );
    for m in manifests {
        let status = match m.status() {
            DownloadStatus::Completed => style(m.status().as_str()).green(),
            DownloadStatus::Failed => style(m.status().as_str()).red(),
            DownloadStatus::Downloading => style(m.status().as_str()).cyan(),
            _ => style(m.status().as_str()).yellow(),
        };
        println!(
            "{:<12}  {:<28}  {:<10}  {:<12}  {}",
            short_id(&m.id),
            truncate(&m.package.software.name, 28),
            truncate(&m.package.software.version, 10),
            status,
            m.hint()
        );
        if detailed {
            let actions: Vec<&str> = available_actions(m.status())
                .iter()
                .map(|a| a.as_str())
                .collect();
            println!("    id:       {}", m.id);
            println!("    bundle:   {}", m.package.software.bundle_id);
            println!("    account:  {} {}", m.account.id, m.account.email);
            println!("    created:  {}", m.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("    actions:  {}", actions.join(", "));
        }
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let mut out: String = value.chars().take(max - 1).collect();
        out.push('…');
        out
    }
}
