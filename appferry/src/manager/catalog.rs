//! Catalog that hands out pre-resolved links.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::error::{ManagerError, ManagerResult};
use super::traits::{BoxFuture, PackageCatalog};
use crate::package::{AccountRef, DownloadTicket, PackageDescriptor};

/// A [`PackageCatalog`] backed by known URLs.
///
/// Useful when the artifact location is already known (a mirror, a link
/// pasted on the command line) and no catalog round-trip is needed.
#[derive(Debug, Default)]
pub struct DirectLinkCatalog {
    links: RwLock<HashMap<(String, String), DownloadTicket>>,
}

impl DirectLinkCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog that knows exactly one package.
    pub fn single(package: &PackageDescriptor, ticket: DownloadTicket) -> Self {
        let catalog = Self::new();
        catalog.insert(package, ticket);
        catalog
    }

    /// Register (or replace) the ticket for a package version.
    pub fn insert(&self, package: &PackageDescriptor, ticket: DownloadTicket) {
        self.links.write().insert(Self::key(package), ticket);
    }

    fn key(package: &PackageDescriptor) -> (String, String) {
        (
            package.software.bundle_id.clone(),
            package.version_id.clone(),
        )
    }
}

impl PackageCatalog for DirectLinkCatalog {
    fn download<'a>(
        &'a self,
        _account: &'a AccountRef,
        package: &'a PackageDescriptor,
    ) -> BoxFuture<'a, ManagerResult<DownloadTicket>> {
        let found = self.links.read().get(&Self::key(package)).cloned();
        Box::pin(async move {
            found.ok_or_else(|| ManagerError::Catalog {
                bundle_id: package.software.bundle_id.clone(),
                reason: format!("no link registered for version {}", package.version_id),
            })
        })
    }
}
