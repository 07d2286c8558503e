//! Error types for the device control bridge.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::document::ToolError;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// How a device tool invocation failed to run to a clean exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionFailure {
    /// The process could not be started.
    Spawn(String),
    /// The process exited with a non-zero status.
    ExitCode(i32),
    /// The process was terminated by a signal (for example killed by the user).
    Terminated,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(reason) => write!(f, "could not be started: {}", reason),
            Self::ExitCode(code) => write!(f, "exited with status {}", code),
            Self::Terminated => f.write_str("was terminated"),
        }
    }
}

/// Errors returned by a [`DeviceBridge`](super::DeviceBridge).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The device tool is not installed at its expected location.
    #[error("device tool not found at {}; install Xcode and launch it once to set up device support", path.display())]
    ToolUnavailable { path: PathBuf },

    /// The device tool did not exit cleanly; its output was not read.
    #[error("`{command}` {failure}")]
    ToolExecutionFailed {
        command: String,
        failure: ExecutionFailure,
    },

    /// The tool's output could not be understood.
    #[error("unexpected device tool output: {reason}")]
    ProtocolError { reason: String },

    /// The device refused the installation.
    #[error("installation rejected: {0}")]
    InstallRejected(#[source] ToolError),

    /// The tool reported a structured error for a query.
    #[error("device tool reported an error: {0}")]
    ToolReported(#[source] ToolError),

    /// This host has no device tool.
    #[error("device control is not supported on this platform")]
    Unsupported,

    /// Local I/O around an invocation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BridgeError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolError {
            reason: reason.into(),
        }
    }

    /// A failure caused by outside interference rather than by the tool.
    ///
    /// An externally terminated tool falls in this class; callers may retry
    /// or stay silent instead of surfacing an error.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::ToolExecutionFailed {
                failure: ExecutionFailure::Terminated,
                ..
            }
        )
    }

    /// The structured tool error, if the tool produced one.
    pub fn tool_error(&self) -> Option<&ToolError> {
        match self {
            Self::InstallRejected(e) | Self::ToolReported(e) => Some(e),
            _ => None,
        }
    }
}
