//! AppFerry - package downloads and device installs
//!
//! This library downloads software packages durably, talks to paired devices
//! through the platform device tool, and serves finished packages to devices
//! over a locally terminated TLS endpoint.
//!
//! - [`manager`]: download state machine, persistence and transfers
//! - [`devicectl`]: device enumeration, app listing and installation
//! - [`installer`]: over-the-air install server and root CA endpoint
//! - [`pipeline`]: hands completed downloads to either install path

pub mod config;
pub mod devicectl;
pub mod installer;
pub mod logging;
pub mod manager;
pub mod package;
pub mod pipeline;

pub use manager::BoxFuture;
