use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Events emitted by the ranged download protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    Started {
        url: String,
        chunk_size: u64,
    },

    /// Destination already present and overwrite not requested
    Skipped {
        url: String,
        dest: String,
        existing_size: u64,
    },

    /// One response body was appended to the destination
    RangeReceived {
        url: String,
        from: u64,
        to: u64,
        total: u64,
    },

    Completed {
        url: String,
        total: u64,
        ranges: u32,
    },

    Failed {
        url: String,
        bytes_written: u64,
        failure: FailureContext,
    },
}
