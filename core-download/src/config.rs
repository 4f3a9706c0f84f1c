//! # Download Configuration

use crate::error::{DownloadError, Result};
use serde::{Deserialize, Serialize};

/// Download manager configuration.
///
/// Target directories come from the user's download settings and are read on
/// every start; this only covers how transfers run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Transfers allowed to run at once. Further tasks wait as `pending`.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Extension of downloaded files
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// Read buffer for transfers, in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            file_extension: default_file_extension(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl DownloadConfig {
    pub fn builder() -> DownloadConfigBuilder {
        DownloadConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }
        let ext = self.file_extension.trim();
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(DownloadError::InvalidConfig(format!(
                "file_extension must be a bare extension, got '{}'",
                self.file_extension
            )));
        }
        if self.chunk_size == 0 {
            return Err(DownloadError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn max_concurrent_downloads(mut self, max: usize) -> Self {
        self.config.max_concurrent_downloads = max;
        self
    }

    pub fn file_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.file_extension = ext.into();
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes;
        self
    }

    pub fn build(self) -> Result<DownloadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_file_extension() -> String {
    "mp3".to_string()
}

fn default_chunk_size() -> usize {
    64 * 1024
}
