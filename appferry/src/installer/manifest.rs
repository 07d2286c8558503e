//! Over-the-air install manifests.

use url::form_urlencoded::byte_serialize;

use crate::package::PackageManifest;

/// Metadata the device shows while installing, plus where to fetch the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallManifest {
    pub package_url: String,
    pub bundle_id: String,
    pub bundle_version: String,
    pub title: String,
    pub artwork_url: Option<String>,
}

impl InstallManifest {
    /// Describe `manifest`'s package served at `package_url`.
    pub fn for_package(manifest: &PackageManifest, package_url: impl Into<String>) -> Self {
        let software = &manifest.package.software;
        Self {
            package_url: package_url.into(),
            bundle_id: software.bundle_id.clone(),
            bundle_version: software.version.clone(),
            title: software.name.clone(),
            artwork_url: software.artwork_url.clone(),
        }
    }

    /// Render as an XML property list.
    pub fn to_plist(&self) -> String {
        let mut assets = asset("software-package", &self.package_url);
        if let Some(artwork) = &self.artwork_url {
            assets.push_str(&asset("display-image", artwork));
            assets.push_str(&asset("full-size-image", artwork));
        }

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>items</key>
  <array>
    <dict>
      <key>assets</key>
      <array>
{assets}      </array>
      <key>metadata</key>
      <dict>
        <key>bundle-identifier</key>
        <string>{bundle_id}</string>
        <key>bundle-version</key>
        <string>{bundle_version}</string>
        <key>kind</key>
        <string>software</string>
        <key>title</key>
        <string>{title}</string>
      </dict>
    </dict>
  </array>
</dict>
</plist>
"#,
            assets = assets,
            bundle_id = escape_xml(&self.bundle_id),
            bundle_version = escape_xml(&self.bundle_version),
            title = escape_xml(&self.title),
        )
    }
}

fn asset(kind: &str, url: &str) -> String {
    format!(
        "        <dict>\n          <key>kind</key>\n          <string>{}</string>\n          <key>url</key>\n          <string>{}</string>\n        </dict>\n",
        kind,
        escape_xml(url)
    )
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// The link that makes a device fetch the manifest at `manifest_url`.
pub fn itms_services_url(manifest_url: &str) -> String {
    let encoded: String = byte_serialize(manifest_url.as_bytes()).collect();
    format!("itms-services://?action=download-manifest&url={}", encoded)
}
