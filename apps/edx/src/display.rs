//! Final result rendering

use crate::error::CliError;
use edx_errors::UserFacingError;
use edx_net::{DownloadReport, UploadReport};
use edx_signing::ExtractReport;
use serde::Serialize;
use std::path::PathBuf;

/// What a command produced
#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OperationResult {
    Download {
        dest: PathBuf,
        #[serde(flatten)]
        report: DownloadReport,
    },
    Upload {
        upload_url: String,
        #[serde(flatten)]
        report: UploadReport,
    },
    Extract {
        dest: PathBuf,
        #[serde(flatten)]
        report: ExtractReport,
    },
}

/// Writes results to stdout, as JSON or as one human-readable line
pub struct OutputRenderer {
    json: bool,
}

impl OutputRenderer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn render_result(&self, result: &OperationResult) -> Result<(), serde_json::Error> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(result)?);
        } else {
            println!("{}", describe(result));
        }
        Ok(())
    }
}

/// JSON document printed on stdout when a command fails in `--json` mode
pub fn error_document(error: &CliError) -> serde_json::Value {
    match error {
        CliError::Edx(e) => serde_json::json!({
            "error": {
                "message": e.user_message(),
                "code": e.user_code(),
                "hint": e.user_hint(),
                "retryable": e.is_retryable(),
                "detail": e,
            }
        }),
        other => serde_json::json!({ "error": { "message": other.to_string() } }),
    }
}

fn describe(result: &OperationResult) -> String {
    match result {
        OperationResult::Download { dest, report } if report.skipped => format!(
            "{} already exists ({} bytes), skipped",
            dest.display(),
            report.bytes
        ),
        OperationResult::Download { dest, report } => format!(
            "Downloaded {} bytes to {} in {} response(s)",
            report.bytes,
            dest.display(),
            report.ranges
        ),
        OperationResult::Upload { upload_url, report } => format!(
            "Uploaded {} bytes in {} chunk(s) to {upload_url}",
            report.bytes, report.chunks_sent
        ),
        OperationResult::Extract { dest, report } => format!(
            "Extracted {} bytes to {}",
            report.content_length,
            dest.display()
        ),
    }
}
