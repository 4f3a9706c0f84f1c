//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by every musicboom crate:
//! - Logging and tracing setup ([`logging`])
//! - Configuration and bridge wiring ([`config`])
//! - The event bus used for change notifications ([`events`])
//! - User settings stored in the key-value settings store ([`settings`])

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod settings;

pub use error::{Error, Result};
