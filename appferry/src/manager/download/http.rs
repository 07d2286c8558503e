//! HTTP transfer with resume support.
//!
//! A partial file left by a suspended transfer is continued with a
//! `Range: bytes=N-` request when the ticket's source supports it. A source
//! that answers a ranged request with a full `200` body restarts the file
//! from zero, so a resume is never corrupted by a server that ignores ranges.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT_RANGES, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::checksum::ArtifactDigest;
use super::progress::TransferProgress;
use crate::manager::error::{ManagerError, ManagerResult};
use crate::manager::traits::{BoxFuture, Transfer};
use crate::package::{DownloadTicket, RangeSupport};

/// Default idle timeout for HTTP transfers in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Write buffer size (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// HTTP-based artifact transfer.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: Client,
    pub(crate) timeout: Duration,
}

impl HttpTransfer {
    /// Create a transfer with the default timeout.
    pub fn new() -> ManagerResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transfer with a custom timeout.
    ///
    /// The timeout bounds connecting and each wait for the next body chunk,
    /// not the whole transfer.
    pub fn with_timeout(timeout: Duration) -> ManagerResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ManagerError::HttpClient(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    async fn fetch_with_resume(
        &self,
        ticket: &DownloadTicket,
        dest: &Path,
        progress: &TransferProgress,
        cancel: &CancellationToken,
    ) -> ManagerResult<u64> {
        let url = ticket.url.as_str();
        let existing_size = match fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let try_range = existing_size > 0 && self.supports_range(ticket).await;
        let response = self.request(url, try_range.then_some(existing_size)).await?;

        let (start_byte, total_size) = match response.status() {
            StatusCode::PARTIAL_CONTENT if try_range => {
                let total = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(total_from_content_range)
                    .or_else(|| response.content_length().map(|len| existing_size + len))
                    .unwrap_or(0);
                debug!(url, offset = existing_size, total, "Resuming transfer");
                (existing_size, total)
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                warn!(url, offset = existing_size, "Range rejected, restarting transfer");
                let response = self.request(url, None).await?;
                return self
                    .write_body(response, url, dest, 0, progress, cancel, ticket)
                    .await;
            }
            status if status.is_success() => {
                if existing_size > 0 {
                    debug!(url, discarded = existing_size, "Source sent full body, restarting");
                }
                (0, response.content_length().unwrap_or(0))
            }
            status => {
                return Err(ManagerError::transfer(
                    url,
                    format!("GET request failed with status {}", status),
                ));
            }
        };

        progress.set_total(total_size);
        self.write_body(response, url, dest, start_byte, progress, cancel, ticket)
            .await
    }

    /// Decide whether a partial file may be continued.
    async fn supports_range(&self, ticket: &DownloadTicket) -> bool {
        match ticket.range_support {
            RangeSupport::Supported => true,
            RangeSupport::Unsupported => false,
            RangeSupport::Probe => match self.client.head(&ticket.url).send().await {
                Ok(r) if r.status().is_success() => r
                    .headers()
                    .get(ACCEPT_RANGES)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.eq_ignore_ascii_case("bytes"))
                    .unwrap_or(false),
                Ok(r) => {
                    debug!(url = %ticket.url, status = %r.status(), "Range probe rejected");
                    false
                }
                Err(e) => {
                    debug!(url = %ticket.url, error = %e, "Range probe failed");
                    false
                }
            },
        }
    }

    async fn request(&self, url: &str, offset: Option<u64>) -> ManagerResult<Response> {
        let mut request = self.client.get(url);
        if let Some(offset) = offset {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }
        request.send().await.map_err(|e| self.request_error(url, e))
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_body(
        &self,
        response: Response,
        url: &str,
        dest: &Path,
        start_byte: u64,
        progress: &TransferProgress,
        cancel: &CancellationToken,
        ticket: &DownloadTicket,
    ) -> ManagerResult<u64> {
        if !response.status().is_success() {
            return Err(ManagerError::transfer(
                url,
                format!("GET request failed with status {}", response.status()),
            ));
        }
        if start_byte == 0 {
            progress.set_total(response.content_length().unwrap_or(0));
        }
        let total_size = progress.total();

        let mut digest = match ticket.sha256 {
            Some(_) => Some(ArtifactDigest::resume_from(dest, start_byte).await?),
            None => None,
        };
        let file = open_destination(dest, start_byte).await?;
        let write_err = |source| ManagerError::WriteFailed {
            path: dest.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
        let mut downloaded = start_byte;
        progress.set_downloaded(downloaded);

        let mut stream = Box::pin(response.bytes_stream());
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    writer.flush().await.map_err(write_err)?;
                    return Err(ManagerError::Cancelled {
                        id: artifact_id(dest),
                    });
                }
                next = tokio::time::timeout(self.timeout, stream.next()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    writer.flush().await.map_err(write_err)?;
                    return Err(ManagerError::Timeout {
                        url: url.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    writer.flush().await.map_err(write_err)?;
                    return Err(self.request_error(url, e));
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            writer.write_all(&chunk).await.map_err(write_err)?;
            if let Some(digest) = digest.as_mut() {
                digest.update(&chunk);
            }
            downloaded += chunk.len() as u64;
            progress.set_downloaded(downloaded);
        }

        writer.flush().await.map_err(write_err)?;
        writer.get_ref().sync_all().await.map_err(write_err)?;
        drop(writer);

        if total_size > 0 && downloaded < total_size {
            return Err(ManagerError::transfer(
                url,
                format!(
                    "connection closed after {} of {} bytes",
                    downloaded, total_size
                ),
            ));
        }

        if let (Some(digest), Some(expected)) = (digest, ticket.sha256.as_deref()) {
            if let Err(e) = digest.verify(dest, expected) {
                // A corrupt artifact must not be resumed from.
                let _ = fs::remove_file(dest).await;
                return Err(e);
            }
        }

        Ok(downloaded)
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> ManagerError {
        if e.is_timeout() {
            ManagerError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            ManagerError::transfer(url, e)
        }
    }
}

impl Transfer for HttpTransfer {
    fn fetch<'a>(
        &'a self,
        ticket: &'a DownloadTicket,
        dest: &'a Path,
        progress: &'a TransferProgress,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, ManagerResult<u64>> {
        Box::pin(self.fetch_with_resume(ticket, dest, progress, cancel))
    }
}

/// Open the destination for appending at `start_byte`, or truncate it.
async fn open_destination(dest: &Path, start_byte: u64) -> ManagerResult<File> {
    if start_byte > 0 {
        return OpenOptions::new()
            .append(true)
            .open(dest)
            .await
            .map_err(|source| ManagerError::WriteFailed {
                path: dest.to_path_buf(),
                source,
            });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| ManagerError::CreateDirFailed {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    File::create(dest)
        .await
        .map_err(|source| ManagerError::WriteFailed {
            path: dest.to_path_buf(),
            source,
        })
}

/// Parse the complete length from `Content-Range: bytes a-b/total`.
fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn artifact_id(dest: &Path) -> String {
    dest.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}
