//! Progress counters shared between a transfer and its observer.
//!
//! The transfer stores byte counts into atomics as chunks land; the manager
//! polls them on its own schedule, so a fast transfer never blocks on the
//! manifest store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Byte counters for one in-flight transfer.
#[derive(Debug, Default)]
pub struct TransferProgress {
    downloaded: AtomicU64,
    total: AtomicU64,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the expected size; zero means unknown.
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn set_downloaded(&self, bytes: u64) {
        self.downloaded.store(bytes, Ordering::SeqCst);
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Fraction complete, or `None` when the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        Some((self.downloaded() as f64 / total as f64).min(1.0))
    }
}

/// Throughput between successive samples.
#[derive(Debug)]
pub struct SpeedMeter {
    last_at: Instant,
    last_bytes: u64,
}

impl SpeedMeter {
    /// Start measuring from `bytes` already on disk.
    pub fn new(bytes: u64) -> Self {
        Self {
            last_at: Instant::now(),
            last_bytes: bytes,
        }
    }

    /// Bytes per second since the previous sample.
    pub fn sample(&mut self, bytes: u64) -> u64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_at).as_secs_f64();
        let delta = bytes.saturating_sub(self.last_bytes);
        self.last_at = now;
        self.last_bytes = bytes;
        if elapsed <= f64::EPSILON {
            return 0;
        }
        (delta as f64 / elapsed) as u64
    }
}

/// Format a size in bytes as a human-readable string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
