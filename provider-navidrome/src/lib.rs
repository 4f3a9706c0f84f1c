//! # Navidrome Provider
//!
//! Implements `MediaServerClient` for Navidrome and other Subsonic-compatible
//! servers.
//!
//! ## Overview
//!
//! - Base URL normalisation that keeps reverse-proxy path prefixes
//! - Bearer-token catalog listing through Navidrome's native API
//! - Subsonic token authentication (pre-derived `token`+`salt`, or a password
//!   hashed with a fresh salt per request)
//! - Catalog walk `getArtists` → `getArtist` → `getAlbum` when no bearer
//!   token works
//! - Stream and cover-art URL construction

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::{normalize_base_url, resolve_subsonic_auth, SubsonicAuth};
pub use client::NavidromeClient;
pub use error::{NavidromeError, Result};
