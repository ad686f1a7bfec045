//! Options and results for ranged downloads

use edx_config::TransferConfig;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Replace an existing destination instead of skipping the download
    pub overwrite: bool,
    /// Bytes per range request; 0 requests the whole resource at once
    pub chunk_size: u64,
    /// Longest wait for the next piece of a response body (default: 30s)
    pub chunk_timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            chunk_size: 4 * 1024 * 1024, // 4MB
            chunk_timeout: Duration::from_secs(30),
        }
    }
}

impl DownloadOptions {
    #[must_use]
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            chunk_size: config.download_chunk_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Outcome of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Bytes now in the destination (the existing size when skipped)
    pub bytes: u64,
    /// Responses whose bodies were written
    pub ranges: u32,
    pub skipped: bool,
}
