//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (retry with backoff, streamed downloads)
//! - `FileSystemAccess` using `tokio::fs`, plus the default database location
//! - `SettingsStore` using an SQLite-backed key-value table
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_database_path, ReqwestHttpClient, TokioFileSystem};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path(default_database_path())
//!     .http_client(Arc::new(ReqwestHttpClient::new()))
//!     .file_system(Arc::new(TokioFileSystem::new()))
//!     .build()?;
//! ```

mod filesystem;
mod http;
mod settings;

pub use filesystem::{default_database_path, TokioFileSystem};
pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;
