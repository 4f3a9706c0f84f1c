//! # Host Bridge Traits
//!
//! Capability traits the core consumes but does not implement itself.
//!
//! ## Overview
//!
//! This crate defines the contract between the musicboom core and the host.
//! Each trait is a narrow seam so the playback and download logic can be
//! tested against mocks and run against different adapters.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP requests and streamed downloads
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Existence checks, reads, writes, atomic renames
//! - [`MediaServerClient`](media::MediaServerClient) - Remote catalog and stream URLs
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences, JSON via [`SettingsStoreExt`](storage::SettingsStoreExt)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Implementations
//!
//! | Trait | Desktop adapter |
//! |-------|-----------------|
//! | `HttpClient` | `bridge_desktop::ReqwestHttpClient` |
//! | `FileSystemAccess` | `bridge_desktop::TokioFileSystem` |
//! | `SettingsStore` | `bridge_desktop::SqliteSettingsStore` |
//! | `MediaServerClient` | `provider_navidrome::NavidromeClient` |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters should
//! convert their native errors into it and keep messages actionable (include
//! the path or status code, never the credentials).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared as
//! `Arc<dyn Trait>` across tokio tasks.

pub mod error;
pub mod http;
pub mod media;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpRequest, HttpResponse, HttpStream, RetryPolicy};
pub use media::{AuthContext, MediaServerClient, Track};
pub use storage::{FileMetadata, FileSystemAccess, SettingsStore, SettingsStoreExt};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
