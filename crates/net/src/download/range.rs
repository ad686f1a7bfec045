//! `Content-Range` handling for partial responses

use edx_errors::{Error, TransferError};
use reqwest::header::{HeaderMap, CONTENT_RANGE};
use std::fmt;
use std::str::FromStr;

/// `Content-Range: bytes from-to/total` of a `206` response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub from: u64,
    pub to: u64,
    pub total: u64,
}

impl ContentRange {
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    /// Read the header from a response
    ///
    /// # Errors
    ///
    /// Returns `TransferError::MissingContentRange` when the header is absent,
    /// unreadable or does not state the total length.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, Error> {
        headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| TransferError::MissingContentRange.into())
    }
}

impl FromStr for ContentRange {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TransferError::InvalidRange(format!("malformed Content-Range '{s}'"));

        let spec = s.trim().strip_prefix("bytes").ok_or_else(malformed)?.trim_start();
        let (span, total) = spec.split_once('/').ok_or_else(malformed)?;
        let (from, to) = span.split_once('-').ok_or_else(malformed)?;

        let from: u64 = from.trim().parse().map_err(|_| malformed())?;
        let to: u64 = to.trim().parse().map_err(|_| malformed())?;
        // "*" means the server does not know the length
        let total: u64 = total.trim().parse().map_err(|_| malformed())?;

        if from > to || to >= total {
            return Err(malformed());
        }
        Ok(Self { from, to, total })
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.from, self.to, self.total)
    }
}

/// Resource length announced by the first partial response
///
/// Fixed for the rest of the download; every continuation must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadRangeInfo {
    pub total_length: u64,
}

impl DownloadRangeInfo {
    #[must_use]
    pub fn new(first: &ContentRange) -> Self {
        Self {
            total_length: first.total,
        }
    }

    /// Check a continuation answer against the request that produced it
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidRange` when the server starts anywhere
    /// but `requested_from` or reports a different total.
    pub fn check_continuation(&self, requested_from: u64, got: &ContentRange) -> Result<(), Error> {
        if got.from != requested_from {
            return Err(TransferError::InvalidRange(format!(
                "requested offset {requested_from}, server sent {got}"
            ))
            .into());
        }
        if got.total != self.total_length {
            return Err(TransferError::InvalidRange(format!(
                "total length changed from {} to {} mid-download",
                self.total_length, got.total
            ))
            .into());
        }
        Ok(())
    }
}
