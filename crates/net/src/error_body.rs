//! Portal error bodies
//!
//! The portal answers failures with `{ HTTPStatus, ErrorCode, ErrorMessage,
//! MoreInfo }`, but proxies in front of it happily return HTML. Parsing is
//! therefore best-effort and never produces a second error of its own.

use edx_errors::{Error, TransferError};
use reqwest::{Response, StatusCode};
use serde::Deserialize;

/// Raw bodies kept for diagnostics are cut to this many bytes
pub const MAX_DIAGNOSTIC_BODY: usize = 2048;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PortalErrorBody {
    #[serde(rename = "HTTPStatus", alias = "httpStatus", default)]
    pub http_status: Option<serde_json::Value>,
    #[serde(rename = "ErrorCode", alias = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "ErrorMessage", alias = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(rename = "MoreInfo", alias = "moreInfo", default)]
    pub more_info: Option<String>,
}

impl PortalErrorBody {
    /// Parse a body, returning `None` for anything that is not a portal error
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let parsed: Self = serde_json::from_str(body.trim()).ok()?;
        if parsed.error_code.is_none() && parsed.error_message.is_none() {
            return None;
        }
        Some(parsed)
    }

    /// `HTTPStatus` as a number, whether the portal sent it as one or as text
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self.http_status.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Error code and message for a failed response
///
/// Falls back to the generic `HTTP <status> <reason>` when the body is not a
/// portal error document.
#[must_use]
pub fn describe_failure(status: StatusCode, body: &str) -> (Option<String>, String) {
    let generic = || match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    };

    match PortalErrorBody::parse(body) {
        Some(parsed) => {
            let mut message = parsed.error_message.clone().unwrap_or_else(generic);
            if let Some(more) = parsed.more_info.as_deref().filter(|m| !m.is_empty()) {
                message = format!("{message} ({more})");
            }
            (parsed.error_code, message)
        }
        None => (None, generic()),
    }
}

/// Cut `body` to at most `max` bytes on a char boundary
#[must_use]
pub fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let cut = (0..=max)
        .rev()
        .find(|i| body.is_char_boundary(*i))
        .unwrap_or(0);
    format!("{}…", &body[..cut])
}

/// Consume a failed response into a terminal protocol error
pub(crate) async fn unexpected_status(operation: &str, response: Response) -> Error {
    let status = response.status();
    // A body that cannot be read still leaves us the status line
    let body = response.text().await.unwrap_or_default();
    let (code, message) = describe_failure(status, &body);
    tracing::debug!(operation, status = status.as_u16(), ?code, %message, "unexpected response");
    TransferError::UnexpectedStatus {
        operation: operation.to_string(),
        status: status.as_u16(),
        code,
        message,
        body: truncate_body(&body, MAX_DIAGNOSTIC_BODY),
    }
    .into()
}
