//! Signed-envelope (PKCS#7 / BER) structural errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum EnvelopeError {
    #[error("unexpected tag 0x{found:02x} at offset {offset}, expected {expected}")]
    UnexpectedTag {
        offset: u64,
        expected: String,
        found: u8,
    },

    #[error("object identifier mismatch at offset {offset}: expected {expected}, found {found}")]
    OidMismatch {
        offset: u64,
        expected: String,
        found: String,
    },

    #[error("unsupported SignedData version at offset {offset}: {found}")]
    VersionMismatch { offset: u64, found: String },

    #[error("unsupported length octet 0x{first_octet:02x} at offset {offset}")]
    UnsupportedLength { offset: u64, first_octet: u8 },

    #[error("input truncated at offset {offset}")]
    Truncated { offset: u64 },

    #[error("indefinite-length nesting deeper than {limit} levels at offset {offset}")]
    NestingTooDeep { offset: u64, limit: u32 },

    #[error("end-of-contents marker not found after offset {offset}")]
    TerminatorNotFound { offset: u64 },

    #[error("extracted {actual} bytes, expected {expected}")]
    LengthMismatch { expected: u64, actual: u64 },
}

impl UserFacingError for EnvelopeError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::OidMismatch { .. } | Self::VersionMismatch { .. } => {
                Some("The file is not a PKCS#7 SignedData envelope with attached content.")
            }
            Self::Truncated { .. } | Self::TerminatorNotFound { .. } => {
                Some("The file looks incomplete; download it again.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnexpectedTag { .. } => "envelope.unexpected_tag",
            Self::OidMismatch { .. } => "envelope.oid_mismatch",
            Self::VersionMismatch { .. } => "envelope.version_mismatch",
            Self::UnsupportedLength { .. } => "envelope.unsupported_length",
            Self::Truncated { .. } => "envelope.truncated",
            Self::NestingTooDeep { .. } => "envelope.nesting_too_deep",
            Self::TerminatorNotFound { .. } => "envelope.terminator_not_found",
            Self::LengthMismatch { .. } => "envelope.length_mismatch",
        };
        Some(code)
    }
}
