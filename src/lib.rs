//! Workspace placeholder crate.
//!
//! Exposes feature flags that forward to the member crates (`core-service`,
//! `core-playback`, `core-download`). Hosts depend on `musicboom-workspace`
//! and pick features instead of wiring each crate by hand:
//!
//! - `desktop-shims` (default): full composition root with desktop adapters
//! - `playback`: resolver, session controller and sequencing only
//! - `downloads`: the download task manager only
