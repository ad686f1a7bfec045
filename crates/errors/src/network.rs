//! Network-related error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum NetworkError {
    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported protocol: {protocol}")]
    UnsupportedProtocol { protocol: String },

    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("rate limited: retry after {seconds} seconds")]
    RateLimited { seconds: u64 },

    #[error("gave up after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error("circuit open for {target}, retry in {retry_after_ms} ms")]
    CircuitOpen { target: String, retry_after_ms: u64 },
}

impl UserFacingError for NetworkError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } | Self::ConnectionRefused(_) | Self::RetriesExhausted { .. } => {
                Some("Check connectivity to the portal and retry.")
            }
            Self::CircuitOpen { .. } => {
                Some("The portal failed repeatedly; wait for the cooldown to pass before retrying.")
            }
            Self::RateLimited { .. } => Some("Wait for the advertised delay before retrying."),
            Self::InvalidUrl(_) | Self::UnsupportedProtocol { .. } => {
                Some("Use an absolute http:// or https:// URL.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::RequestFailed(_)
            | Self::ConnectionRefused(_)
            | Self::RateLimited { .. }
            | Self::RetriesExhausted { .. }
            | Self::CircuitOpen { .. } => true,
            Self::HttpError { status, .. } => *status == 408 || *status >= 500,
            Self::InvalidUrl(_) | Self::UnsupportedProtocol { .. } => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Timeout { .. } => "network.timeout",
            Self::RequestFailed(_) => "network.request_failed",
            Self::ConnectionRefused(_) => "network.connection_refused",
            Self::InvalidUrl(_) => "network.invalid_url",
            Self::UnsupportedProtocol { .. } => "network.unsupported_protocol",
            Self::HttpError { .. } => "network.http_error",
            Self::RateLimited { .. } => "network.rate_limited",
            Self::RetriesExhausted { .. } => "network.retries_exhausted",
            Self::CircuitOpen { .. } => "network.circuit_open",
        };
        Some(code)
    }
}
