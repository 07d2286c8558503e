//! Artifact digest computed while the body is written.
//!
//! A resumed transfer seeds the digest with the bytes already on disk, so
//! the finished artifact is never read back in full just to be verified.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::manager::error::{ManagerError, ManagerResult};

/// Read size when seeding from a partial artifact.
const SEED_CHUNK: usize = 64 * 1024;

/// Running SHA-256 over an artifact's bytes.
#[derive(Debug, Clone, Default)]
pub struct ArtifactDigest {
    hasher: Sha256,
    bytes: u64,
}

impl ArtifactDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the first `len` bytes of a partial artifact at `path`.
    pub async fn resume_from(path: &Path, len: u64) -> ManagerResult<Self> {
        let read_err = |source| ManagerError::ReadFailed {
            path: path.to_path_buf(),
            source,
        };
        let mut digest = Self::new();
        if len == 0 {
            return Ok(digest);
        }

        let mut prefix = File::open(path).await.map_err(read_err)?.take(len);
        let mut buffer = vec![0u8; SEED_CHUNK];
        loop {
            let n = prefix.read(&mut buffer).await.map_err(read_err)?;
            if n == 0 {
                break;
            }
            digest.update(&buffer[..n]);
        }
        if digest.bytes != len {
            return Err(ManagerError::transfer(
                path.display().to_string(),
                format!("partial artifact shrank to {} of {} bytes", digest.bytes, len),
            ));
        }
        Ok(digest)
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Lowercase hex digest.
    pub fn hex(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }

    /// Compare against the ticket's expected digest (case-insensitive).
    pub fn verify(self, artifact: &Path, expected: &str) -> ManagerResult<()> {
        let actual = self.hex();
        if actual.eq_ignore_ascii_case(expected) {
            return Ok(());
        }
        Err(ManagerError::ChecksumMismatch {
            filename: artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_chunks_hash_like_one_buffer() {
        let mut digest = ArtifactDigest::new();
        digest.update(b"hello");
        digest.update(b" ");
        digest.update(b"world");
        assert_eq!(digest.len(), 11);
        assert_eq!(digest.hex(), HELLO_WORLD);
    }

    #[tokio::test]
    async fn test_resume_from_partial_prefix() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.part");
        std::fs::write(&path, b"hello wor").unwrap();

        // Only the first six bytes belong to the transfer being continued.
        let mut digest = ArtifactDigest::resume_from(&path, 6).await.unwrap();
        digest.update(b"world");
        assert_eq!(digest.hex(), HELLO_WORLD);
    }

    #[tokio::test]
    async fn test_resume_from_missing_file() {
        let result = ArtifactDigest::resume_from(Path::new("/nonexistent/a.part"), 10).await;
        assert!(matches!(result, Err(ManagerError::ReadFailed { .. })));
        assert!(ArtifactDigest::resume_from(Path::new("/nonexistent/a.part"), 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_verify_ignores_case() {
        let mut digest = ArtifactDigest::new();
        digest.update(b"hello world");
        assert!(digest
            .verify(Path::new("a.ipa"), &HELLO_WORLD.to_uppercase())
            .is_ok());
    }

    #[test]
    fn test_verify_mismatch_names_artifact() {
        let mut digest = ArtifactDigest::new();
        digest.update(b"hello world");
        match digest.verify(Path::new("/dl/abc.part"), "deadbeef") {
            Err(ManagerError::ChecksumMismatch {
                filename, actual, ..
            }) => {
                assert_eq!(filename, "abc.part");
                assert_eq!(actual, HELLO_WORLD);
            }
            other => panic!("expected ChecksumMismatch, got {:?}", other),
        }
    }
}
