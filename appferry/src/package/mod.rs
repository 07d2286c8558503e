//! Package domain types.
//!
//! This module defines the records the rest of the crate passes around:
//!
//! - [`Software`] / [`PackageDescriptor`]: what was requested from the catalog
//! - [`AccountRef`]: who requested it
//! - [`DownloadTicket`]: how to fetch it, including whether ranged resume works
//! - [`PackageManifest`] / [`DownloadState`]: the persisted transfer record

mod core;
mod manifest;
mod ticket;

pub use self::core::{AccountRef, PackageDescriptor, Software};
pub use manifest::{DownloadState, DownloadStatus, PackageManifest};
pub use ticket::{DownloadTicket, RangeSupport};
