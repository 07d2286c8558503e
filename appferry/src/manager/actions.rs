//! User-facing actions on a download.

use std::fmt;
use std::str::FromStr;

use crate::package::DownloadStatus;

/// An operation a user can request on a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadAction {
    Suspend,
    Resume,
    Restart,
    Delete,
}

impl DownloadAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Restart => "restart",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for DownloadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "suspend" | "pause" => Ok(Self::Suspend),
            "resume" => Ok(Self::Resume),
            "restart" => Ok(Self::Restart),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown download action '{}'", other)),
        }
    }
}

/// Actions offered for a manifest in `status`.
pub fn available_actions(status: DownloadStatus) -> &'static [DownloadAction] {
    use DownloadAction::*;
    match status {
        DownloadStatus::Pending | DownloadStatus::Downloading => &[Suspend, Delete],
        DownloadStatus::Paused => &[Resume, Delete],
        DownloadStatus::Failed => &[Restart, Delete],
        DownloadStatus::Completed => &[Delete],
    }
}
