//! # Library Management Module
//!
//! Owns the catalog database shared by playback and downloads.
//!
//! ## Overview
//!
//! - SQLite pool creation with embedded migrations ([`db`])
//! - Repositories for local songs, download records and recent plays
//! - [`LocalLibrary`] for importing user files
//! - [`PlayHistory`] for the recently-played list
//!
//! Song ids are shared across all three tables: a local import, a download
//! record and a recent play for the same remote song carry the same id.

pub mod db;
pub mod error;
pub mod history;
pub mod local;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use history::PlayHistory;
pub use local::LocalLibrary;
pub use models::{DownloadRecord, DownloadStatus, LocalSong, RecentPlay, Track};
