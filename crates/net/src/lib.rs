#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Transfer layer for edx
//!
//! Chunk planning, the retry and circuit-breaker decorator, and the two
//! resumable transfer protocols spoken with the document portal: the
//! session-based chunked upload and the ranged download.

mod client;
mod download;
mod error_body;
mod plan;
pub mod resilience;
mod upload;
mod validation;

pub use client::{NetClient, NetConfig};
pub use download::{
    ContentRange, DownloadCoordinator, DownloadOptions, DownloadRangeInfo, DownloadReport,
};
pub use error_body::{describe_failure, truncate_body, PortalErrorBody, MAX_DIAGNOSTIC_BODY};
pub use plan::{ChunkIter, ChunkPlan, ChunkRange};
pub use resilience::{
    BreakerRegistry, BreakerSettings, CircuitBreaker, CircuitState, ResiliencePolicy, RetryPolicy,
};
pub use upload::{
    AcceptedRangeInfo, Payload, UploadCoordinator, UploadOptions, UploadReport, UploadSession,
    UploadState,
};

use edx_errors::{Error, NetworkError};
use edx_events::EventSender;
use std::path::Path;
use url::Url;

/// Download a file with default options
///
/// # Errors
///
/// Returns an error if the URL is invalid, the download fails, or there are
/// I/O errors while writing the file.
pub async fn download_file(
    client: &NetClient,
    url: &str,
    dest: &Path,
    tx: &EventSender,
) -> Result<DownloadReport, Error> {
    DownloadCoordinator::new(client.clone(), tx.clone())
        .download(url, dest, &DownloadOptions::default())
        .await
}

/// Parse and validate a URL
///
/// # Errors
///
/// Returns an error if the URL string is malformed or invalid according to RFC 3986.
pub fn parse_url(url: &str) -> Result<Url, Error> {
    Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()).into())
}
