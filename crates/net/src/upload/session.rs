//! Upload session and accepted-range documents

use chrono::{DateTime, Utc};
use edx_errors::{Error, TransferError};
use serde::{Deserialize, Serialize};

/// Upload session granted by the portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadSession {
    #[serde(alias = "uploadUrl")]
    pub upload_url: String,
    #[serde(rename = "ExpirationDateTime", alias = "expirationDateTime")]
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    #[must_use]
    pub fn new(upload_url: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            upload_url: upload_url.into(),
            expires_at,
        }
    }

    /// Parse the body of a session-creation response
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidSession` if the document is unreadable.
    pub fn parse(body: &str) -> Result<Self, Error> {
        serde_json::from_str(body)
            .map_err(|e| TransferError::InvalidSession(format!("unreadable session document: {e}")).into())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Body of a `202 Accepted` chunk response
///
/// Consumed immediately by the coordinator; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AcceptedRangeInfo {
    #[serde(
        rename = "NextExpectedRange",
        alias = "NextExpectedRanges",
        alias = "nextExpectedRanges",
        default
    )]
    pub next_expected_ranges: Vec<String>,
    #[serde(rename = "ExpirationDateTime", alias = "expirationDateTime", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AcceptedRangeInfo {
    /// # Errors
    ///
    /// Returns `TransferError::InvalidRange` if the document is unreadable.
    pub fn parse(body: &str) -> Result<Self, Error> {
        serde_json::from_str(body).map_err(|e| {
            TransferError::InvalidRange(format!("unreadable accepted-range document: {e}")).into()
        })
    }

    /// Start of the first range the portal still expects
    ///
    /// Entries look like `"from-to"` or the open-ended `"from-"`; when several
    /// are offered the first one wins.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidRange` when no entry is present or the
    /// first one does not parse.
    pub fn next_offset(&self) -> Result<u64, Error> {
        let first = self
            .next_expected_ranges
            .first()
            .ok_or_else(|| TransferError::InvalidRange("no next expected range".to_string()))?;
        parse_range_start(first)
            .ok_or_else(|| TransferError::InvalidRange(format!("malformed expected range '{first}'")).into())
    }
}

fn parse_range_start(entry: &str) -> Option<u64> {
    let (from, to) = entry.trim().split_once('-')?;
    let from: u64 = from.trim().parse().ok()?;
    let to = to.trim();
    if !to.is_empty() {
        let to: u64 = to.parse().ok()?;
        if to < from {
            return None;
        }
    }
    Some(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_document() {
        let session = UploadSession::parse(
            r#"{"UploadUrl":"https://portal.example/up/1","ExpirationDateTime":"2030-01-02T03:04:05Z"}"#,
        )
        .unwrap();
        assert_eq!(session.upload_url, "https://portal.example/up/1");
        assert!(!session.is_expired_at("2030-01-01T00:00:00Z".parse().unwrap()));
        assert!(session.is_expired_at("2030-01-02T03:04:05Z".parse().unwrap()));

        let camel = UploadSession::parse(
            r#"{"uploadUrl":"https://portal.example/up/2","expirationDateTime":"2030-01-02T03:04:05.1234567+00:00"}"#,
        )
        .unwrap();
        assert_eq!(camel.upload_url, "https://portal.example/up/2");

        assert!(UploadSession::parse("<html/>").is_err());
    }

    #[test]
    fn test_first_expected_range_wins() {
        let info = AcceptedRangeInfo::parse(
            r#"{"NextExpectedRange":["4096-8191","9000-9999"],"ExpirationDateTime":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(info.next_offset().unwrap(), 4096);
        assert!(info.expires_at.is_some());
    }

    #[test]
    fn test_open_ended_range() {
        let info = AcceptedRangeInfo::parse(r#"{"NextExpectedRange":["12-"]}"#).unwrap();
        assert_eq!(info.next_offset().unwrap(), 12);
        assert_eq!(info.expires_at, None);
    }

    #[test]
    fn test_malformed_ranges_are_rejected() {
        for body in [
            r#"{"NextExpectedRange":[]}"#,
            r#"{"NextExpectedRange":["abc"]}"#,
            r#"{"NextExpectedRange":["9-3"]}"#,
            r#"{}"#,
        ] {
            let info = AcceptedRangeInfo::parse(body).unwrap();
            assert!(info.next_offset().is_err(), "{body} should be rejected");
        }
        assert!(AcceptedRangeInfo::parse("not json").is_err());
    }
}
