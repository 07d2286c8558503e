//! Download manager.
//!
//! Tracks one [`PackageManifest`](crate::package::PackageManifest) per
//! requested package, drives its transfer and keeps the record durable
//! across restarts.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use appferry::manager::{DownloadManager, FileManifestStore, HttpTransfer, ManagerConfig};
//!
//! let config = ManagerConfig::new("/var/lib/appferry");
//! let store = Arc::new(FileManifestStore::open(&config.state_dir)?);
//! let manager = DownloadManager::open(config, store, Arc::new(HttpTransfer::new()?))?;
//!
//! let manifest = manager.add(account, package, ticket).await?;
//! manager.resume(&manifest.id).await?;
//! let finished = manager.wait_until_settled(&manifest.id).await?;
//! ```

mod actions;
mod catalog;
mod config;
pub mod download;
mod downloads;
mod error;
mod store;
mod traits;

pub use actions::{available_actions, DownloadAction};
pub use catalog::DirectLinkCatalog;
pub use config::ManagerConfig;
pub use download::{HttpTransfer, TransferProgress};
pub use downloads::{DownloadManager, ManifestEvent};
pub use error::{ManagerError, ManagerResult};
pub use store::{FileManifestStore, MemoryManifestStore, StoreError, StoreResult};
pub use traits::{BoxFuture, ManifestStore, PackageCatalog, Transfer};
