//! # Track Transfer
//!
//! Copies a stream URL to a file on disk. Bytes go to `{target}.part` first
//! and are renamed into place only after the stream ended at the announced
//! length, so a file under its final name is always complete.
//!
//! Cancellation is checked between chunks; a cancelled or failed transfer
//! removes its partial file.

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpStream};
use bridge_traits::storage::{partial_path, FileSystemAccess};
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Receives transfer progress as a raw percentage.
///
/// Values are unclamped and may repeat; the receiver decides what to keep.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: f64);
}

/// One file to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub url: String,
    pub target: PathBuf,
    /// Size from the catalog, used when the server sends no length
    pub expected_size: Option<u64>,
}

#[async_trait]
pub trait TrackTransfer: Send + Sync {
    /// Fetch `request.url` into `request.target`, returning the bytes written
    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// Streams over the host [`HttpClient`] into the host file system.
pub struct HttpTrackTransfer {
    http_client: Arc<dyn HttpClient>,
    file_system: Arc<dyn FileSystemAccess>,
    chunk_size: usize,
}

impl HttpTrackTransfer {
    pub fn new(http_client: Arc<dyn HttpClient>, file_system: Arc<dyn FileSystemAccess>) -> Self {
        Self {
            http_client,
            file_system,
            chunk_size: 64 * 1024,
        }
    }

    /// Transfer using the read buffer size from `config`
    pub fn from_config(
        http_client: Arc<dyn HttpClient>,
        file_system: Arc<dyn FileSystemAccess>,
        config: &DownloadConfig,
    ) -> Self {
        Self::new(http_client, file_system).with_chunk_size(config.chunk_size)
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    async fn copy_to(
        &self,
        stream: &mut HttpStream,
        partial: &Path,
        total: Option<u64>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut writer = self.file_system.open_write_stream(partial).await?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut written: u64 = 0;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                read = stream.reader.read(&mut buffer) => read.map_err(BridgeError::from)?,
            };
            if read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..read])
                .await
                .map_err(BridgeError::from)?;
            written += read as u64;

            if let Some(total) = total {
                progress.report(written as f64 * 100.0 / total as f64).await;
            }
        }

        writer.shutdown().await.map_err(BridgeError::from)?;

        if let Some(expected) = stream.content_length {
            if written != expected {
                return Err(DownloadError::Transfer(format!(
                    "stream ended after {} of {} bytes",
                    written, expected
                )));
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl TrackTransfer for HttpTrackTransfer {
    #[instrument(skip(self, request, progress, cancel))]
    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let shown = request.target.to_string_lossy();
        debug!(file = strip_path(&shown), "Starting transfer");

        if let Some(parent) = request.target.parent() {
            self.file_system.create_dir_all(parent).await?;
        }

        let mut stream = self.http_client.download_stream(request.url.clone()).await?;
        let total = stream
            .content_length
            .or(request.expected_size)
            .filter(|size| *size > 0);

        let partial = partial_path(&request.target);
        let result = self
            .copy_to(&mut stream, &partial, total, progress, cancel)
            .await;

        let outcome = match result {
            Ok(_) if cancel.is_cancelled() => Err(DownloadError::Cancelled),
            other => other,
        };

        match outcome {
            Ok(written) => {
                self.file_system.rename(&partial, &request.target).await?;
                debug!(bytes = written, "Transfer complete");
                Ok(written)
            }
            Err(e) => {
                let _ = self.file_system.delete_file(&partial).await;
                Err(e)
            }
        }
    }
}
