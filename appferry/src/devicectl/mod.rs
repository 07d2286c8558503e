//! Device control bridge.
//!
//! Talks to paired devices through the platform's device tool:
//!
//! ```text
//! DeviceBridge (trait)
//!     ├── DeviceCtl ──── CommandRunner ──── devicectl <cmd> -j <tmp.json> -q
//!     │                        │
//!     │                        └── exit outcome; JSON document read from tmp.json
//!     └── UnsupportedHost (no device tool on this platform)
//! ```
//!
//! Calls are stateless and not cancellable. Non-zero exits surface as
//! [`BridgeError::ToolExecutionFailed`] without reading the output file;
//! clean exits always read it and check the embedded error first.

mod app;
mod bridge;
mod device;
mod document;
mod error;
mod runner;

pub use app::InstalledApp;
pub use bridge::{default_bridge, BridgeConfig, DeviceBridge, DeviceCtl, UnsupportedHost, DEVICECTL_PATH};
pub use device::{Device, DeviceRejection, DeviceType};
pub use document::ToolError;
pub use error::{BridgeError, BridgeResult, ExecutionFailure};
pub use runner::{CommandRunner, ExitOutcome, TokioCommandRunner};
