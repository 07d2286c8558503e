//! Error types for the download manager.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::store::StoreError;

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur while managing downloads.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// An equivalent manifest is already queued or in progress.
    #[error("download {id} already exists and has not completed")]
    DuplicateRequest { id: String },

    /// No manifest with this id.
    #[error("download {id} not found")]
    NotFound { id: String },

    /// The transfer itself failed.
    #[error("failed to download {url}: {reason}")]
    Transfer { url: String, reason: String },

    /// Network timeout.
    #[error("download of {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    /// Checksum verification failed.
    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// The package catalog could not issue a ticket.
    #[error("catalog lookup failed for {bundle_id}: {reason}")]
    Catalog { bundle_id: String, reason: String },

    /// The transfer was suspended or deleted before it settled.
    #[error("download {id} was cancelled")]
    Cancelled { id: String },

    /// Failed to read a file.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// The manifest store rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ManagerError {
    /// Build a transfer error from anything displayable.
    pub fn transfer(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transfer {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
