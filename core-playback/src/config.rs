//! # Resolver Configuration

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source resolver configuration.
///
/// The cache directory itself is a user setting re-read on every resolution;
/// this only holds how the cache is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Extension of cache files (`{cache_dir}/{track_id}.{ext}`)
    ///
    /// Default: `mp3`.
    #[serde(default = "default_cache_extension")]
    pub cache_extension: String,

    /// Download the whole stream into the cache before playing it.
    ///
    /// When disabled, uncached tracks always play online.
    ///
    /// Default: true.
    #[serde(default = "default_fill_cache")]
    pub fill_cache: bool,

    /// Upper bound for a cache fill; on expiry the track plays online.
    ///
    /// Default: 2 minutes.
    #[serde(default = "default_fill_timeout")]
    pub fill_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_extension: default_cache_extension(),
            fill_cache: default_fill_cache(),
            fill_timeout: default_fill_timeout(),
        }
    }
}

impl ResolverConfig {
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        let ext = self.cache_extension.trim();
        if ext.is_empty() {
            return Err(PlaybackError::Internal(
                "cache_extension cannot be empty".to_string(),
            ));
        }
        if ext.contains(['/', '\\', '.']) {
            return Err(PlaybackError::Internal(format!(
                "cache_extension must be a bare extension, got '{}'",
                ext
            )));
        }
        if self.fill_timeout.is_zero() {
            return Err(PlaybackError::Internal(
                "fill_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    pub fn cache_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.cache_extension = ext.into();
        self
    }

    pub fn fill_cache(mut self, enabled: bool) -> Self {
        self.config.fill_cache = enabled;
        self
    }

    pub fn fill_timeout(mut self, timeout: Duration) -> Self {
        self.config.fill_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ResolverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn default_cache_extension() -> String {
    "mp3".to_string()
}

fn default_fill_cache() -> bool {
    true
}

fn default_fill_timeout() -> Duration {
    Duration::from_secs(120)
}
