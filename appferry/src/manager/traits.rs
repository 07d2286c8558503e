//! Capability traits used by the download manager.
//!
//! The manager never talks to the network, the catalog or the disk directly;
//! it goes through these seams so each can be swapped in tests:
//!
//! - [`PackageCatalog`]: turns a package request into a [`DownloadTicket`]
//! - [`Transfer`]: moves bytes from a ticket's source into a local file
//! - [`ManifestStore`]: durable manifest records
//!
//! Async methods return [`BoxFuture`] so the traits stay dyn-compatible.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use super::download::TransferProgress;
use super::error::ManagerResult;
use super::store::StoreResult;
use crate::package::{AccountRef, DownloadTicket, PackageDescriptor, PackageManifest};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote package catalog.
///
/// Authentication and lookup live behind this trait; the manager only needs
/// a ticket it can hand to a [`Transfer`].
pub trait PackageCatalog: Send + Sync {
    /// Request a transfer ticket for `package` on behalf of `account`.
    fn download<'a>(
        &'a self,
        account: &'a AccountRef,
        package: &'a PackageDescriptor,
    ) -> BoxFuture<'a, ManagerResult<DownloadTicket>>;
}

/// Byte transfer for one ticket.
pub trait Transfer: Send + Sync {
    /// Fetch `ticket` into `dest`, returning the final size in bytes.
    ///
    /// An existing partial `dest` is continued when the ticket's source
    /// supports ranged requests and truncated otherwise. Implementations
    /// update `progress` as bytes land and return
    /// [`ManagerError::Cancelled`](super::ManagerError::Cancelled) promptly
    /// once `cancel` fires, leaving the bytes written so far on disk.
    fn fetch<'a>(
        &'a self,
        ticket: &'a DownloadTicket,
        dest: &'a Path,
        progress: &'a TransferProgress,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ManagerResult<u64>>;
}

/// Durable manifest records, keyed by manifest id.
///
/// Every `save` must be atomic per record: after a crash a reader sees either
/// the previous or the new record, never a torn one.
pub trait ManifestStore: Send + Sync {
    /// Load every readable record. Unreadable records are skipped.
    fn load_all(&self) -> StoreResult<Vec<PackageManifest>>;

    /// Load one record.
    fn load(&self, id: &str) -> StoreResult<Option<PackageManifest>>;

    /// Durably write one record, replacing any previous version.
    fn save(&self, manifest: &PackageManifest) -> StoreResult<()>;

    /// Remove one record. Removing a missing record is not an error.
    fn remove(&self, id: &str) -> StoreResult<()>;
}
