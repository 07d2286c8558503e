//! CLI error type with exit codes and user guidance.

use std::fmt;

use appferry::config::ConfigError;
use appferry::devicectl::BridgeError;
use appferry::installer::InstallerError;
use appferry::manager::ManagerError;
use appferry::pipeline::PipelineError;

/// Errors surfaced to the user by the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Bad configuration or arguments.
    Config(String),
    /// Configuration file could not be loaded.
    ConfigFile(ConfigError),
    /// A download operation failed.
    Manager(ManagerError),
    /// The device tool failed.
    Bridge(BridgeError),
    /// The install server failed.
    Installer(InstallerError),
    /// A manifest id or prefix matched nothing, or more than one manifest.
    UnknownManifest(String),
    /// The download is not finished yet.
    NotCompleted(String),
    /// The user interrupted a running command.
    Interrupted,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::ConfigFile(_) => 2,
            Self::Bridge(BridgeError::ToolUnavailable { .. } | BridgeError::Unsupported) => 3,
            Self::Installer(_) => 4,
            Self::UnknownManifest(_) | Self::NotCompleted(_) => 5,
            Self::Interrupted => 130,
            Self::Manager(_) | Self::Bridge(_) => 1,
        }
    }

    /// A hint on how to fix the problem, if there is one.
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Bridge(BridgeError::ToolUnavailable { .. }) => Some(
                "Install Xcode from the App Store and open it once so it can install \
                 its device support components.",
            ),
            Self::Bridge(BridgeError::Unsupported) => Some(
                "Installing through the device tool needs macOS with Xcode. \
                 Use 'appferry serve' to install over the air instead.",
            ),
            Self::Installer(e) if e.needs_trust() => Some(
                "Run 'appferry certificate', open the shown URL on the device and install \
                 the profile. Then enable full trust for it under Settings > General > \
                 About > Certificate Trust Settings.",
            ),
            Self::Installer(InstallerError::CertificateLoad { .. }) => Some(
                "Place server-key.pem, server-cert.pem and root-ca.pem in the certificate \
                 directory, or set certificate_dir in config.ini [installer] section.",
            ),
            Self::Manager(ManagerError::DuplicateRequest { .. }) => {
                Some("Use 'appferry downloads list' to see the existing download.")
            }
            Self::UnknownManifest(_) => {
                Some("Use 'appferry downloads list' to see download ids.")
            }
            Self::NotCompleted(_) => {
                Some("Use 'appferry downloads resume <id>' to finish the download first.")
            }
            _ => None,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "{}", msg),
            Self::ConfigFile(e) => write!(f, "{}", e),
            Self::Manager(e) => write!(f, "{}", e),
            Self::Bridge(e) => write!(f, "{}", e),
            Self::Installer(e) => write!(f, "{}", e),
            Self::UnknownManifest(msg) => write!(f, "{}", msg),
            Self::NotCompleted(id) => write!(f, "download {} has not completed", id),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigFile(e) => Some(e),
            Self::Manager(e) => Some(e),
            Self::Bridge(e) => Some(e),
            Self::Installer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::ConfigFile(e)
    }
}

impl From<ManagerError> for CliError {
    fn from(e: ManagerError) -> Self {
        Self::Manager(e)
    }
}

impl From<BridgeError> for CliError {
    fn from(e: BridgeError) -> Self {
        Self::Bridge(e)
    }
}

impl From<InstallerError> for CliError {
    fn from(e: InstallerError) -> Self {
        Self::Installer(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::NotCompleted { id, .. } => Self::NotCompleted(id),
            PipelineError::NoInstallServer => {
                Self::Config("over-the-air install is not configured".to_string())
            }
            PipelineError::Manager(e) => Self::Manager(e),
            PipelineError::Bridge(e) => Self::Bridge(e),
            PipelineError::Installer(e) => Self::Installer(e),
        }
    }
}
