use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Events emitted while driving the chunked upload protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UploadEvent {
    /// Portal granted an upload session
    SessionCreated {
        upload_url: String,
        expires_at: String,
    },

    /// A chunk was written and the portal asked for more
    ChunkAccepted {
        upload_url: String,
        from: u64,
        to: u64,
        total: u64,
        /// Offset the portal expects next; authoritative over our own count.
        next_offset: u64,
    },

    Completed {
        upload_url: String,
        total: u64,
        chunks_sent: u32,
    },

    /// Session deadline passed before the next chunk could be written
    Expired {
        upload_url: String,
        offset: u64,
        expired_at: String,
    },

    Failed {
        upload_url: String,
        offset: u64,
        failure: FailureContext,
    },

    /// Caller tore the session down after a failure
    SessionCancelled {
        upload_url: String,
    },
}
