//! Persisted download manifests.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountRef, DownloadTicket, PackageDescriptor};

/// Transfer status of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether a manifest in this status blocks an equivalent `add`.
    ///
    /// Only `completed` releases the slot; a failed manifest is still owned
    /// by its request until it is restarted or deleted.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer state: status plus progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadState {
    pub status: DownloadStatus,
    /// Fraction complete, in `[0.0, 1.0]`.
    pub percent: f64,
    /// Human-readable throughput; empty unless downloading.
    #[serde(default)]
    pub speed: String,
    /// Failure description; only set while `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadState {
    pub fn pending() -> Self {
        Self {
            status: DownloadStatus::Pending,
            percent: 0.0,
            speed: String::new(),
            error: None,
        }
    }

    /// Record progress without ever moving `percent` backwards.
    pub fn advance(&mut self, percent: f64, speed: impl Into<String>) {
        let percent = percent.clamp(0.0, 1.0);
        if percent > self.percent {
            self.percent = percent;
        }
        self.speed = speed.into();
    }

    pub fn mark_downloading(&mut self) {
        self.status = DownloadStatus::Downloading;
        self.error = None;
    }

    pub fn mark_paused(&mut self) {
        self.status = DownloadStatus::Paused;
        self.speed.clear();
    }

    pub fn mark_completed(&mut self) {
        self.status = DownloadStatus::Completed;
        self.percent = 1.0;
        self.speed.clear();
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = DownloadStatus::Failed;
        self.speed.clear();
        self.error = Some(error.into());
    }

    /// Back to a fresh `pending` state, discarding progress and error.
    pub fn reset(&mut self) {
        *self = Self::pending();
    }
}

impl Default for DownloadState {
    fn default() -> Self {
        Self::pending()
    }
}

/// One requested package download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Stable id, see [`PackageDescriptor::manifest_id`].
    pub id: String,
    pub account: AccountRef,
    pub package: PackageDescriptor,
    pub created_at: DateTime<Utc>,
    pub ticket: DownloadTicket,
    pub state: DownloadState,
}

impl PackageManifest {
    /// Create a new `pending` manifest.
    pub fn new(account: AccountRef, package: PackageDescriptor, ticket: DownloadTicket) -> Self {
        Self {
            id: package.manifest_id(&account),
            account,
            package,
            created_at: Utc::now(),
            ticket,
            state: DownloadState::pending(),
        }
    }

    pub fn status(&self) -> DownloadStatus {
        self.state.status
    }

    /// Short status line for list views.
    pub fn hint(&self) -> String {
        if let Some(error) = &self.state.error {
            return error.clone();
        }
        match self.state.status {
            DownloadStatus::Pending => "Pending...".to_string(),
            DownloadStatus::Downloading => {
                let percent = (self.state.percent * 100.0).floor() as u32;
                if self.state.speed.is_empty() {
                    format!("{}%", percent)
                } else {
                    format!("{}% {}/s", percent, self.state.speed)
                }
            }
            DownloadStatus::Paused => "Paused".to_string(),
            DownloadStatus::Completed => "Completed".to_string(),
            DownloadStatus::Failed => "Failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Software;

    fn manifest() -> PackageManifest {
        PackageManifest::new(
            AccountRef::new("acct", "a@example.com"),
            PackageDescriptor::new(Software::new("com.example.app", "Example", "1.0"), "100"),
            DownloadTicket::new("https://example.com/a.ipa"),
        )
    }

    #[test]
    fn test_new_manifest_is_pending() {
        let m = manifest();
        assert_eq!(m.status(), DownloadStatus::Pending);
        assert_eq!(m.state.percent, 0.0);
        assert_eq!(m.hint(), "Pending...");
    }

    #[test]
    fn test_advance_never_decreases() {
        let mut state = DownloadState::pending();
        state.advance(0.5, "1.0 MB");
        state.advance(0.3, "2.0 MB");
        assert_eq!(state.percent, 0.5);
        assert_eq!(state.speed, "2.0 MB");
        state.advance(7.0, "");
        assert_eq!(state.percent, 1.0);
    }

    #[test]
    fn test_hint_downloading() {
        let mut m = manifest();
        m.state.mark_downloading();
        m.state.advance(0.427, "1.5 MB");
        assert_eq!(m.hint(), "42% 1.5 MB/s");
    }

    #[test]
    fn test_hint_prefers_error() {
        let mut m = manifest();
        m.state.mark_failed("connection reset");
        assert_eq!(m.hint(), "connection reset");
    }

    #[test]
    fn test_completed_clears_speed_and_error() {
        let mut state = DownloadState::pending();
        state.mark_failed("boom");
        state.mark_downloading();
        state.advance(0.2, "10 KB");
        state.mark_completed();
        assert_eq!(state.status, DownloadStatus::Completed);
        assert_eq!(state.percent, 1.0);
        assert!(state.speed.is_empty());
        assert!(state.error.is_none());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DownloadStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }

    #[test]
    fn test_only_completed_is_inactive() {
        assert!(DownloadStatus::Failed.is_active());
        assert!(DownloadStatus::Paused.is_active());
        assert!(!DownloadStatus::Completed.is_active());
    }
}
