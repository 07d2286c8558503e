//! Configuration for the download manager.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the download manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory where package artifacts are written.
    ///
    /// In-flight transfers use `<id>.part`; finished ones are renamed to `<id>.ipa`.
    pub download_dir: PathBuf,

    /// Directory holding one JSON record per manifest.
    pub state_dir: PathBuf,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Minimum interval between persisted progress updates.
    pub progress_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".appferry");
        Self {
            download_dir: base.join("downloads"),
            state_dir: base.join("manifests"),
            timeout: Duration::from_secs(300),
            progress_interval: Duration::from_millis(500),
        }
    }
}

impl ManagerConfig {
    /// Create a configuration rooted at `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            download_dir: base.join("downloads"),
            state_dir: base.join("manifests"),
            ..Default::default()
        }
    }

    /// Set the artifact directory.
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = dir;
        self
    }

    /// Set the manifest record directory.
    pub fn with_state_dir(mut self, dir: PathBuf) -> Self {
        self.state_dir = dir;
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the progress persistence interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Path of the in-flight artifact for a manifest.
    pub fn partial_path(&self, id: &str) -> PathBuf {
        self.download_dir.join(format!("{}.part", id))
    }

    /// Path of the finished artifact for a manifest.
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.download_dir.join(format!("{}.ipa", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_roots_directories() {
        let config = ManagerConfig::new("/data");
        assert_eq!(config.download_dir, PathBuf::from("/data/downloads"));
        assert_eq!(config.state_dir, PathBuf::from("/data/manifests"));
        assert_eq!(config.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_builders() {
        let config = ManagerConfig::new("/data")
            .with_download_dir(PathBuf::from("/dl"))
            .with_progress_interval(Duration::from_millis(50));
        assert_eq!(config.download_dir, PathBuf::from("/dl"));
        assert_eq!(config.progress_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_artifact_paths() {
        let config = ManagerConfig::new("/data");
        assert_eq!(
            config.partial_path("abc"),
            PathBuf::from("/data/downloads/abc.part")
        );
        assert_eq!(
            config.artifact_path("abc"),
            PathBuf::from("/data/downloads/abc.ipa")
        );
    }
}
