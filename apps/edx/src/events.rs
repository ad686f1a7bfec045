//! Structured logging of library events
//!
//! Every event becomes one tracing record with its fields attached, so the
//! same stream serves the console formatter and the JSON formatter.

use edx_events::{AppEvent, DownloadEvent, GeneralEvent, ResilienceEvent, UploadEvent};
use tracing::{debug, error, info, warn};

/// Log an `AppEvent` at the level matching its severity
pub fn log_event_with_tracing(event: &AppEvent) {
    match event {
        AppEvent::General(general) => log_general(general),
        AppEvent::Upload(upload) => log_upload(upload),
        AppEvent::Download(download) => log_download(download),
        AppEvent::Resilience(resilience) => log_resilience(resilience),
    }
}

fn log_general(event: &GeneralEvent) {
    match event {
        GeneralEvent::Warning { message, context } => {
            warn!(context = context.as_deref().unwrap_or_default(), "{message}");
        }
        GeneralEvent::DebugLog { message, context } => {
            debug!(context = ?context, "{message}");
        }
        GeneralEvent::OperationStarted { operation } => {
            info!(operation = %operation, "Operation started");
        }
        GeneralEvent::OperationCompleted { operation, success } => {
            info!(operation = %operation, success, "Operation completed");
        }
    }
}

fn log_upload(event: &UploadEvent) {
    match event {
        UploadEvent::SessionCreated {
            upload_url,
            expires_at,
        } => {
            info!(upload_url = %upload_url, expires_at = %expires_at, "Upload session created");
        }
        UploadEvent::ChunkAccepted {
            upload_url,
            from,
            to,
            total,
            next_offset,
        } => {
            info!(
                upload_url = %upload_url,
                from,
                to,
                total,
                next_offset,
                "Chunk accepted"
            );
        }
        UploadEvent::Completed {
            upload_url,
            total,
            chunks_sent,
        } => {
            info!(upload_url = %upload_url, total, chunks_sent, "Upload completed");
        }
        UploadEvent::Expired {
            upload_url,
            offset,
            expired_at,
        } => {
            warn!(upload_url = %upload_url, offset, expired_at = %expired_at, "Upload session expired");
        }
        UploadEvent::Failed {
            upload_url,
            offset,
            failure,
        } => {
            error!(
                upload_url = %upload_url,
                offset,
                retryable = failure.retryable,
                code = ?failure.code,
                message = %failure.message,
                hint = ?failure.hint,
                "Upload failed"
            );
        }
        UploadEvent::SessionCancelled { upload_url } => {
            info!(upload_url = %upload_url, "Upload session cancelled");
        }
    }
}

fn log_download(event: &DownloadEvent) {
    match event {
        DownloadEvent::Started { url, chunk_size } => {
            info!(url = %url, chunk_size, "Download started");
        }
        DownloadEvent::Skipped {
            url,
            dest,
            existing_size,
        } => {
            info!(url = %url, dest = %dest, existing_size, "Download skipped, destination exists");
        }
        DownloadEvent::RangeReceived {
            url,
            from,
            to,
            total,
        } => {
            debug!(url = %url, from, to, total, "Range received");
        }
        DownloadEvent::Completed { url, total, ranges } => {
            info!(url = %url, total, ranges, "Download completed");
        }
        DownloadEvent::Failed {
            url,
            bytes_written,
            failure,
        } => {
            error!(
                url = %url,
                bytes_written,
                retryable = failure.retryable,
                code = ?failure.code,
                message = %failure.message,
                hint = ?failure.hint,
                "Download failed"
            );
        }
    }
}

fn log_resilience(event: &ResilienceEvent) {
    match event {
        ResilienceEvent::RetryScheduled {
            target,
            attempt,
            max_attempts,
            reason,
            delay,
        } => {
            warn!(
                target_origin = %target,
                attempt,
                max_attempts,
                reason = %reason,
                delay = ?delay,
                "Retry scheduled"
            );
        }
        ResilienceEvent::CircuitOpened {
            target,
            consecutive_failures,
            cooldown,
        } => {
            warn!(
                target_origin = %target,
                consecutive_failures,
                cooldown = ?cooldown,
                "Circuit opened"
            );
        }
        ResilienceEvent::CircuitRejected {
            target,
            retry_after,
        } => {
            warn!(
                target_origin = %target,
                retry_after = ?retry_after,
                "Call rejected by open circuit"
            );
        }
        ResilienceEvent::CircuitClosed { target } => {
            info!(target_origin = %target, "Circuit closed");
        }
    }
}
