//! Catalog-facing package identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the identity hash.
const MANIFEST_ID_LEN: usize = 32;

/// Reference to the account a download was requested with.
///
/// Credentials never live here; the catalog client resolves them from the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    /// Stable account identifier.
    pub id: String,
    /// Account e-mail, shown to the user.
    pub email: String,
}

impl AccountRef {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// A catalog software entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Software {
    /// Bundle identifier, e.g. `com.example.app`.
    pub bundle_id: String,
    /// Display name.
    pub name: String,
    /// Marketing version string of this entry.
    pub version: String,
    /// Artwork shown by the device while installing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<String>,
}

impl Software {
    pub fn new(
        bundle_id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            name: name.into(),
            version: version.into(),
            artwork_url: None,
        }
    }

    /// Set the artwork URL (builder pattern).
    pub fn with_artwork_url(mut self, url: impl Into<String>) -> Self {
        self.artwork_url = Some(url.into());
        self
    }
}

/// A software entry pinned to one catalog version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub software: Software,
    /// Catalog-side version identifier (not the marketing version).
    pub version_id: String,
}

impl PackageDescriptor {
    pub fn new(software: Software, version_id: impl Into<String>) -> Self {
        Self {
            software,
            version_id: version_id.into(),
        }
    }

    /// Derive the manifest id for this package requested by `account`.
    ///
    /// The id is a truncated SHA-256 over account, bundle and version so the
    /// same request always maps to the same manifest.
    pub fn manifest_id(&self, account: &AccountRef) -> String {
        let mut hasher = Sha256::new();
        hasher.update(account.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.software.bundle_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.version_id.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..MANIFEST_ID_LEN].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(version_id: &str) -> PackageDescriptor {
        PackageDescriptor::new(Software::new("com.example.app", "Example", "1.0"), version_id)
    }

    #[test]
    fn test_manifest_id_is_stable() {
        let account = AccountRef::new("acct-1", "a@example.com");
        assert_eq!(
            package("100").manifest_id(&account),
            package("100").manifest_id(&account)
        );
        assert_eq!(package("100").manifest_id(&account).len(), MANIFEST_ID_LEN);
    }

    #[test]
    fn test_manifest_id_differs_by_version_and_account() {
        let a = AccountRef::new("acct-1", "a@example.com");
        let b = AccountRef::new("acct-2", "b@example.com");
        assert_ne!(package("100").manifest_id(&a), package("101").manifest_id(&a));
        assert_ne!(package("100").manifest_id(&a), package("100").manifest_id(&b));
    }

    #[test]
    fn test_email_does_not_affect_id() {
        let a = AccountRef::new("acct-1", "old@example.com");
        let b = AccountRef::new("acct-1", "new@example.com");
        assert_eq!(package("1").manifest_id(&a), package("1").manifest_id(&b));
    }
}
