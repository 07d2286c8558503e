//! Single-artifact transfers.
//!
//! - Resumable HTTP transfer honouring the ticket's range capability (`http`)
//! - SHA-256 of the artifact, computed while it is written (`checksum`)
//! - Shared progress counters and throughput formatting (`progress`)

mod checksum;
mod http;
mod progress;

pub use checksum::ArtifactDigest;
pub use http::HttpTransfer;
pub use progress::{format_size, SpeedMeter, TransferProgress};
