//! Applications installed on a device.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// An installed application as reported by the device tool.
///
/// Field names follow the tool's JSON so records decode directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    pub bundle_identifier: String,
    pub name: String,
    pub version: String,
    pub bundle_version: String,
    pub app_clip: bool,
    /// First-party flag as the tool names it.
    pub built_by_developer: bool,
    pub default_app: bool,
    pub hidden: bool,
    pub internal_app: bool,
    pub removable: bool,
    pub url: String,
}

impl InstalledApp {
    /// The bundle identifier doubles as the app id.
    pub fn id(&self) -> &str {
        &self.bundle_identifier
    }
}

/// Decode every well-formed app record, dropping the rest.
pub fn decode_apps(records: &[Value]) -> Vec<InstalledApp> {
    records
        .iter()
        .filter_map(|record| match InstalledApp::deserialize(record) {
            Ok(app) => Some(app),
            Err(e) => {
                debug!(error = %e, "Skipping app record");
                None
            }
        })
        .collect()
}
