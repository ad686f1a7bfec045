//! Chunked transfer protocol errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum TransferError {
    /// The portal answered with a status outside the expected success codes.
    #[error("unexpected HTTP {status} during {operation}: {message}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        code: Option<String>,
        message: String,
        body: String,
    },

    #[error("upload session expired at {expired_at}")]
    SessionExpired { expired_at: String },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("partial content response without a usable Content-Range header")]
    MissingContentRange,

    #[error("transfer stalled at offset {offset}: {reason}")]
    Stalled { offset: u64, reason: String },

    #[error("refusing to upload an empty payload")]
    EmptyPayload,

    #[error("invalid upload session: {0}")]
    InvalidSession(String),

    #[error("destination length {actual} does not match expected offset {expected}")]
    LengthMismatch { expected: u64, actual: u64 },
}

impl UserFacingError for TransferError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::UnexpectedStatus {
                status, message, ..
            } => Cow::Owned(format!("portal rejected the request (HTTP {status}): {message}")),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::SessionExpired { .. } => {
                Some("Request a new upload session and start the upload again.")
            }
            Self::Stalled { .. } | Self::LengthMismatch { .. } => {
                Some("Partial output was kept for inspection; delete it before retrying.")
            }
            Self::EmptyPayload => Some("The source file is empty; nothing to send."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::UnexpectedStatus { status, .. } => *status == 408 || *status >= 500,
            Self::SessionExpired { .. } | Self::Stalled { .. } => true,
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnexpectedStatus { .. } => "transfer.unexpected_status",
            Self::SessionExpired { .. } => "transfer.session_expired",
            Self::InvalidRange(_) => "transfer.invalid_range",
            Self::MissingContentRange => "transfer.missing_content_range",
            Self::Stalled { .. } => "transfer.stalled",
            Self::EmptyPayload => "transfer.empty_payload",
            Self::InvalidSession(_) => "transfer.invalid_session",
            Self::LengthMismatch { .. } => "transfer.length_mismatch",
        };
        Some(code)
    }
}
