//! Configuration file.
//!
//! Settings live in `~/.appferry/config.ini`:
//!
//! ```ini
//! [downloads]
//! directory = ~/.appferry/downloads
//! state_directory = ~/.appferry/manifests
//! timeout_secs = 300
//! progress_interval_ms = 500
//!
//! [installer]
//! certificate_dir = ~/.appferry/certificates
//! server_name = app.localhost.qaq.wiki
//! bind_address = 127.0.0.1
//! port = 0
//! ca_port = 0
//!
//! [devicectl]
//! path = /usr/bin/devicectl
//! temp_dir = /tmp
//!
//! [logging]
//! level = info
//! directory = ~/.appferry/logs
//! ```
//!
//! Every key is optional. A missing file means all defaults.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::devicectl::BridgeConfig;
use crate::installer::InstallerConfig;
use crate::logging::LoggingConfig;
use crate::manager::ManagerConfig;

/// Errors reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Location of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// `~/.appferry`, or `./.appferry` without a home directory.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".appferry")
}

/// Contents of the configuration file, with defaults filled in.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub downloads: ManagerConfig,
    pub installer: InstallerConfig,
    pub devicectl: BridgeConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load from [`config_file_path`].
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`; defaults if the file does not exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parse already-loaded INI content.
    pub fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("downloads")) {
            let s = Section::new("downloads", section);
            let downloads = &mut config.downloads;
            if let Some(dir) = s.path("directory") {
                downloads.download_dir = dir;
            }
            if let Some(dir) = s.path("state_directory") {
                downloads.state_dir = dir;
            }
            if let Some(secs) = s.parse::<u64>("timeout_secs")? {
                downloads.timeout = Duration::from_secs(secs);
            }
            if let Some(ms) = s.parse::<u64>("progress_interval_ms")? {
                downloads.progress_interval = Duration::from_millis(ms);
            }
        }

        if let Some(section) = ini.section(Some("installer")) {
            let s = Section::new("installer", section);
            let installer = &mut config.installer;
            if let Some(dir) = s.path("certificate_dir") {
                installer.certificate_dir = dir;
            }
            if let Some(name) = s.string("server_name") {
                installer.server_name = name;
            }
            if let Some(addr) = s.parse::<IpAddr>("bind_address")? {
                installer.bind_addr = addr;
            }
            if let Some(port) = s.parse::<u16>("port")? {
                installer.port = port;
            }
            if let Some(port) = s.parse::<u16>("ca_port")? {
                installer.ca_port = port;
            }
        }

        if let Some(section) = ini.section(Some("devicectl")) {
            let s = Section::new("devicectl", section);
            if let Some(path) = s.path("path") {
                config.devicectl.tool_path = path;
            }
            if let Some(dir) = s.path("temp_dir") {
                config.devicectl.temp_dir = Some(dir);
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            let s = Section::new("logging", section);
            if let Some(level) = s.string("level") {
                config.logging.level = level;
            }
            if let Some(dir) = s.path("directory") {
                config.logging.directory = Some(dir);
            }
        }

        Ok(config)
    }
}

/// Typed access to one INI section. Empty values count as unset.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn string(&self, key: &str) -> Option<String> {
        self.props
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.string(key).map(|v| expand_tilde(&v))
    }

    fn parse<T>(&self, key: &'static str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.string(key) else {
            return Ok(None);
        };
        value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                section: self.name,
                key,
                reason: e.to_string(),
                value,
            })
    }
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(value: &str) -> PathBuf {
    match value.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => dirs::home_dir()
            .map(|home| home.join(rest.trim_start_matches('/')))
            .unwrap_or_else(|| PathBuf::from(value)),
        _ => PathBuf::from(value),
    }
}
