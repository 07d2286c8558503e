//! Transfer tickets issued by the package catalog.

use serde::{Deserialize, Serialize};

/// Whether a ticket's source can continue a partial transfer.
///
/// Catalog sources differ here, so the capability travels with the ticket
/// instead of being assumed by the transfer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSupport {
    /// The source honours `Range` requests.
    Supported,
    /// The source always sends the full body; resume restarts from zero.
    Unsupported,
    /// Ask the source (`Accept-Ranges` on a HEAD request).
    #[default]
    Probe,
}

/// Everything needed to fetch one package artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTicket {
    /// Artifact URL.
    pub url: String,
    /// Expected SHA-256 of the finished artifact (lowercase hex).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Ranged transfer capability of `url`.
    #[serde(default)]
    pub range_support: RangeSupport,
}

impl DownloadTicket {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha256: None,
            range_support: RangeSupport::Probe,
        }
    }

    /// Set the expected checksum (builder pattern).
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().to_lowercase());
        self
    }

    /// Set the ranged transfer capability (builder pattern).
    pub fn with_range_support(mut self, support: RangeSupport) -> Self {
        self.range_support = support;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_defaults_to_probe() {
        let ticket = DownloadTicket::new("https://example.com/a.ipa");
        assert_eq!(ticket.range_support, RangeSupport::Probe);
        assert!(ticket.sha256.is_none());
    }

    #[test]
    fn test_checksum_is_normalised() {
        let ticket = DownloadTicket::new("https://example.com/a.ipa").with_sha256("ABCDEF");
        assert_eq!(ticket.sha256.as_deref(), Some("abcdef"));
    }

    #[test]
    fn test_missing_range_support_deserializes_as_probe() {
        let ticket: DownloadTicket =
            serde_json::from_str(r#"{"url":"https://example.com/a.ipa"}"#).unwrap();
        assert_eq!(ticket.range_support, RangeSupport::Probe);
    }
}
