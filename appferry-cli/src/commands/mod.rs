//! CLI command implementations.

pub mod common;
pub mod devices;
pub mod downloads;
pub mod install;
pub mod serve;
