//! Device bridge implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::app::{decode_apps, InstalledApp};
use super::device::{decode_devices, Device};
use super::document::{embedded_error, parse_document, result_array};
use super::error::{BridgeError, BridgeResult, ExecutionFailure};
use super::runner::{CommandRunner, ExitOutcome, TokioCommandRunner};
use crate::BoxFuture;

/// Fixed install location of the device tool.
pub const DEVICECTL_PATH: &str =
    "/Library/Developer/PrivateFrameworks/CoreDevice.framework/Versions/A/Resources/bin/devicectl";

/// Device enumeration, app listing and installation.
///
/// One implementation exists per host platform; pick it with
/// [`default_bridge`].
pub trait DeviceBridge: Send + Sync {
    /// Paired devices reachable over their tunnel.
    fn list_devices(&self) -> BoxFuture<'_, BridgeResult<Vec<Device>>>;

    /// Apps installed on `device_id`, optionally narrowed to one bundle.
    fn list_apps<'a>(
        &'a self,
        device_id: &'a str,
        bundle_id: Option<&'a str>,
    ) -> BoxFuture<'a, BridgeResult<Vec<InstalledApp>>>;

    /// Install the artifact at `artifact` onto `device_id`.
    fn install<'a>(&'a self, artifact: &'a Path, device_id: &'a str)
        -> BoxFuture<'a, BridgeResult<()>>;
}

/// Configuration for [`DeviceCtl`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path of the device tool.
    pub tool_path: PathBuf,
    /// Where per-call output files are created; the system temp dir if `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tool_path: PathBuf::from(DEVICECTL_PATH),
            temp_dir: None,
        }
    }
}

impl BridgeConfig {
    pub fn with_tool_path(mut self, path: PathBuf) -> Self {
        self.tool_path = path;
        self
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = Some(dir);
        self
    }
}

/// Bridge backed by the `devicectl` command-line tool.
///
/// Every call runs the tool once with `-j <file> -q`, waits for it, then
/// reads the JSON it wrote. The output file is removed when the call ends,
/// whatever the outcome.
pub struct DeviceCtl {
    config: BridgeConfig,
    runner: Arc<dyn CommandRunner>,
}

impl DeviceCtl {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioCommandRunner))
    }

    pub fn with_runner(config: BridgeConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Run one tool command and return its parsed output document.
    async fn invoke(&self, args: &[&str]) -> BridgeResult<Value> {
        let tool = &self.config.tool_path;
        if !tokio::fs::try_exists(tool).await.unwrap_or(false) {
            return Err(BridgeError::ToolUnavailable { path: tool.clone() });
        }

        let temp_dir = self
            .config
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        // Deleted on drop, on every return path below.
        let output = tempfile::Builder::new()
            .prefix("appferry-devicectl-")
            .suffix(".json")
            .tempfile_in(&temp_dir)
            .map_err(|source| BridgeError::Io {
                context: format!("failed to create output file in {}", temp_dir.display()),
                source,
            })?
            .into_temp_path();

        let command = format!("devicectl {}", args.join(" "));
        let mut argv: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        argv.push("-j".to_string());
        argv.push(output.to_string_lossy().into_owned());
        argv.push("-q".to_string());

        debug!(%command, "Invoking device tool");
        let outcome = self.runner.run(tool, &argv).await.map_err(|e| {
            BridgeError::ToolExecutionFailed {
                command: command.clone(),
                failure: ExecutionFailure::Spawn(e.to_string()),
            }
        })?;

        let failure = match outcome {
            ExitOutcome::Exited(0) => None,
            ExitOutcome::Exited(code) => Some(ExecutionFailure::ExitCode(code)),
            ExitOutcome::Signalled => Some(ExecutionFailure::Terminated),
        };
        if let Some(failure) = failure {
            warn!(%command, %failure, "Device tool did not exit cleanly");
            return Err(BridgeError::ToolExecutionFailed { command, failure });
        }

        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|e| BridgeError::protocol(format!("output file unreadable: {}", e)))?;
        parse_document(&bytes)
    }
}

impl DeviceBridge for DeviceCtl {
    fn list_devices(&self) -> BoxFuture<'_, BridgeResult<Vec<Device>>> {
        Box::pin(async move {
            let document = self.invoke(&["list", "devices"]).await?;
            if let Some(error) = embedded_error(&document)? {
                return Err(BridgeError::ToolReported(error));
            }
            let records = result_array(&document, "devices")?;
            let devices = decode_devices(records);
            debug!(
                reported = records.len(),
                usable = devices.len(),
                "Listed devices"
            );
            Ok(devices)
        })
    }

    fn list_apps<'a>(
        &'a self,
        device_id: &'a str,
        bundle_id: Option<&'a str>,
    ) -> BoxFuture<'a, BridgeResult<Vec<InstalledApp>>> {
        Box::pin(async move {
            let mut args = vec![
                "device",
                "info",
                "apps",
                "--include-all-apps",
                "-d",
                device_id,
            ];
            if let Some(bundle_id) = bundle_id {
                args.extend(["--bundle-id", bundle_id]);
            }

            let document = self.invoke(&args).await?;
            if let Some(error) = embedded_error(&document)? {
                return Err(BridgeError::ToolReported(error));
            }
            let mut apps = decode_apps(result_array(&document, "apps")?);
            if let Some(bundle_id) = bundle_id {
                apps.retain(|app| app.bundle_identifier == bundle_id);
                apps.truncate(1);
            }
            Ok(apps)
        })
    }

    fn install<'a>(
        &'a self,
        artifact: &'a Path,
        device_id: &'a str,
    ) -> BoxFuture<'a, BridgeResult<()>> {
        Box::pin(async move {
            let artifact_arg = artifact.to_string_lossy().into_owned();
            let document = self
                .invoke(&[
                    "device",
                    "install",
                    "app",
                    "-d",
                    device_id,
                    artifact_arg.as_str(),
                ])
                .await?;
            if let Some(error) = embedded_error(&document)? {
                warn!(device = device_id, domain = %error.domain, code = error.code, "Install rejected");
                return Err(BridgeError::InstallRejected(error));
            }
            info!(device = device_id, artifact = %artifact.display(), "Installed package");
            Ok(())
        })
    }
}

/// Bridge for hosts without a device tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedHost;

impl DeviceBridge for UnsupportedHost {
    fn list_devices(&self) -> BoxFuture<'_, BridgeResult<Vec<Device>>> {
        Box::pin(async { Err(BridgeError::Unsupported) })
    }

    fn list_apps<'a>(
        &'a self,
        _device_id: &'a str,
        _bundle_id: Option<&'a str>,
    ) -> BoxFuture<'a, BridgeResult<Vec<InstalledApp>>> {
        Box::pin(async { Err(BridgeError::Unsupported) })
    }

    fn install<'a>(
        &'a self,
        _artifact: &'a Path,
        _device_id: &'a str,
    ) -> BoxFuture<'a, BridgeResult<()>> {
        Box::pin(async { Err(BridgeError::Unsupported) })
    }
}

/// The bridge for the current host platform.
#[cfg(target_os = "macos")]
pub fn default_bridge(config: BridgeConfig) -> Arc<dyn DeviceBridge> {
    Arc::new(DeviceCtl::new(config))
}

/// The bridge for the current host platform.
#[cfg(not(target_os = "macos"))]
pub fn default_bridge(_config: BridgeConfig) -> Arc<dyn DeviceBridge> {
    Arc::new(UnsupportedHost)
}
