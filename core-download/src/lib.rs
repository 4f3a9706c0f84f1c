//! # Download Module
//!
//! Background song downloads into the user's music directory.
//!
//! - [`manager`]: the task queue (concurrency limit, cancellation, persisted
//!   records, startup recovery)
//! - [`transfer`]: streaming a URL to disk through a `.part` file
//! - [`path`]: choosing a collision-free target path
//! - [`status`]: "already downloaded?" checks against catalog and disk

pub mod config;
pub mod error;
pub mod manager;
pub mod path;
pub mod status;
pub mod transfer;

pub use config::{DownloadConfig, DownloadConfigBuilder};
pub use error::{DownloadError, Result};
pub use manager::{clamp_progress, DownloadManager, INTERRUPTED_MESSAGE};
pub use path::{resolve_target_path, sanitize_file_name, PathReservations};
pub use status::{check_download_status, filter_undownloaded};
pub use transfer::{HttpTrackTransfer, ProgressSink, TrackTransfer, TransferRequest};
