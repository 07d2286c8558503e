//! Manifest persistence.
//!
//! [`FileManifestStore`] keeps one JSON document per manifest in a directory.
//! Writes go to `<id>.json.tmp`, are synced, then renamed over `<id>.json`,
//! so a crash mid-write leaves the previous record intact. The directory is
//! synced after the rename so the new entry itself is durable. Stray `.tmp`
//! files from an interrupted write are ignored on load.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use super::traits::ManifestStore;
use crate::package::PackageManifest;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the manifest store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("manifest store I/O error at {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// A record could not be encoded.
    #[error("failed to encode manifest {id}: {source}")]
    Encode {
        id: String,
        source: serde_json::Error,
    },

    /// The write task died before finishing.
    #[error("manifest write for {id} was aborted: {reason}")]
    Aborted { id: String, reason: String },

    /// A record exists but cannot be decoded.
    #[error("corrupt manifest record {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

const RECORD_EXTENSION: &str = "json";

/// Directory-backed manifest store.
#[derive(Debug)]
pub struct FileManifestStore {
    dir: PathBuf,
}

impl FileManifestStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    fn read_record(path: &Path) -> StoreResult<PackageManifest> {
        let data = fs::read(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl ManifestStore for FileManifestStore {
    fn load_all(&self) -> StoreResult<Vec<PackageManifest>> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut manifests = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match Self::read_record(&path) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => warn!(error = %e, "Skipping manifest record"),
            }
        }

        manifests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        debug!(count = manifests.len(), dir = %self.dir.display(), "Loaded manifests");
        Ok(manifests)
    }

    fn load(&self, id: &str) -> StoreResult<Option<PackageManifest>> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn save(&self, manifest: &PackageManifest) -> StoreResult<()> {
        let path = self.record_path(&manifest.id);
        let tmp = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));

        let data = serde_json::to_vec_pretty(manifest).map_err(|source| StoreError::Encode {
            id: manifest.id.clone(),
            source,
        })?;

        let io_err = |source| StoreError::Io {
            path: tmp.clone(),
            source,
        };
        let mut file = File::create(&tmp).map_err(io_err)?;
        file.write_all(&data).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        sync_dir(&self.dir)
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// Flush directory entries so a completed rename survives power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> StoreResult<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> StoreResult<()> {
    Ok(())
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    records: Mutex<HashMap<String, PackageManifest>>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ManifestStore for MemoryManifestStore {
    fn load_all(&self) -> StoreResult<Vec<PackageManifest>> {
        let mut manifests: Vec<_> = self.records.lock().values().cloned().collect();
        manifests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(manifests)
    }

    fn load(&self, id: &str) -> StoreResult<Option<PackageManifest>> {
        Ok(self.records.lock().get(id).cloned())
    }

    fn save(&self, manifest: &PackageManifest) -> StoreResult<()> {
        self.records
            .lock()
            .insert(manifest.id.clone(), manifest.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        self.records.lock().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{AccountRef, DownloadTicket, PackageDescriptor, Software};
    use tempfile::TempDir;

    fn manifest(version_id: &str) -> PackageManifest {
        PackageManifest::new(
            AccountRef::new("acct", "a@example.com"),
            PackageDescriptor::new(
                Software::new("com.example.app", "Example", "1.0"),
                version_id,
            ),
            DownloadTicket::new("https://example.com/a.ipa"),
        )
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = FileManifestStore::open(temp.path()).unwrap();
        let mut m = manifest("1");
        m.state.mark_downloading();
        m.state.advance(0.4, "1 MB");
        store.save(&m).unwrap();

        let loaded = store.load(&m.id).unwrap().unwrap();
        assert_eq!(loaded, m);
        assert_eq!(store.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_save_replaces_record_without_leftovers() {
        let temp = TempDir::new().unwrap();
        let store = FileManifestStore::open(temp.path()).unwrap();
        let mut m = manifest("1");
        store.save(&m).unwrap();
        m.state.mark_failed("boom");
        store.save(&m).unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![format!("{}.json", m.id)]);
        assert_eq!(
            store.load(&m.id).unwrap().unwrap().state.error.as_deref(),
            Some("boom")
        );
    }

    #[test]
    fn test_load_all_skips_corrupt_and_temp_records() {
        let temp = TempDir::new().unwrap();
        let store = FileManifestStore::open(temp.path()).unwrap();
        store.save(&manifest("1")).unwrap();
        fs::write(temp.path().join("broken.json"), b"{not json").unwrap();
        fs::write(temp.path().join("other.json.tmp"), b"{}").unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_load_corrupt_record_is_error() {
        let temp = TempDir::new().unwrap();
        let store = FileManifestStore::open(temp.path()).unwrap();
        fs::write(temp.path().join("broken.json"), b"[").unwrap();
        assert!(matches!(
            store.load("broken"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = FileManifestStore::open(temp.path()).unwrap();
        let m = manifest("1");
        store.save(&m).unwrap();
        store.remove(&m.id).unwrap();
        store.remove(&m.id).unwrap();
        assert!(store.load(&m.id).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_dir() {
        let temp = TempDir::new().unwrap();
        sync_dir(temp.path()).unwrap();

        let gone = temp.path().join("gone");
        match sync_dir(&gone) {
            Err(StoreError::Io { path, .. }) => assert_eq!(path, gone),
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryManifestStore::new();
        let m = manifest("1");
        store.save(&m).unwrap();
        assert_eq!(store.load(&m.id).unwrap(), Some(m.clone()));
        store.remove(&m.id).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
