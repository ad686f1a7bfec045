//! Upload state machine

use super::payload::Payload;
use super::session::{AcceptedRangeInfo, UploadSession};
use crate::client::NetClient;
use crate::error_body::unexpected_status;
use crate::plan::{ChunkPlan, ChunkRange};
use crate::validation::validate_url;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use edx_config::TransferConfig;
use edx_errors::{Error, NetworkError, TransferError};
use edx_events::{EventEmitter, EventSender, FailureContext, UploadEvent};
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Lifecycle of one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    RequestingSession,
    Uploading,
    Completed,
    Expired,
    Failed,
}

impl UploadState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired | Self::Failed)
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestingSession => "requesting-session",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// 0 sends the payload as a single range
    pub chunk_size: u64,
    /// Consecutive accepted responses without forward progress before giving up
    pub max_stalled_rounds: u32,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024 * 1024,
            max_stalled_rounds: 3,
        }
    }
}

impl UploadOptions {
    #[must_use]
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            chunk_size: config.upload_chunk_size,
            max_stalled_rounds: config.max_stalled_rounds.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub bytes: u64,
    pub chunks_sent: u32,
    pub state: UploadState,
}

/// Drives one upload at a time through the session protocol
///
/// Chunks are strictly sequential: the offset of the next write is whatever
/// the portal declared in its previous answer.
pub struct UploadCoordinator {
    client: NetClient,
    options: UploadOptions,
    tx: EventSender,
    state: UploadState,
}

impl UploadCoordinator {
    #[must_use]
    pub fn new(client: NetClient, options: UploadOptions, tx: EventSender) -> Self {
        Self {
            client,
            options,
            tx,
            state: UploadState::RequestingSession,
        }
    }

    #[must_use]
    pub fn state(&self) -> UploadState {
        self.state
    }

    #[must_use]
    pub fn options(&self) -> UploadOptions {
        self.options
    }

    /// Ask the portal for an upload session
    ///
    /// # Errors
    ///
    /// Returns a network error if the portal cannot be reached, an
    /// `UnexpectedStatus` for any answer other than 200/201 and
    /// `InvalidSession` if the granted session is unusable.
    pub async fn create_session(&mut self, session_url: &str) -> Result<UploadSession, Error> {
        self.state = UploadState::RequestingSession;
        let session = self.request_session(session_url).await.inspect_err(|err| {
            tracing::warn!(%session_url, error = %err, "upload session request failed");
        });
        if session.is_err() {
            self.state = UploadState::Failed;
        }
        session
    }

    async fn request_session(&self, session_url: &str) -> Result<UploadSession, Error> {
        validate_url(session_url)?;
        let response = self
            .client
            .execute(session_url, &self.tx, |client| {
                client
                    .post(session_url)
                    .header(ACCEPT, "application/json")
                    .header(CONTENT_LENGTH, 0)
            })
            .await?;

        if !matches!(response.status(), StatusCode::OK | StatusCode::CREATED) {
            return Err(unexpected_status("create upload session", response).await);
        }

        let session = UploadSession::parse(&read_text(response).await?)?;
        if let Err(e) = validate_url(&session.upload_url) {
            return Err(TransferError::InvalidSession(format!(
                "portal returned unusable upload URL '{}': {e}",
                session.upload_url
            ))
            .into());
        }

        tracing::info!(upload_url = %session.upload_url, expires_at = %session.expires_at, "upload session created");
        self.tx.emit_upload(UploadEvent::SessionCreated {
            upload_url: session.upload_url.clone(),
            expires_at: session.expires_at.to_rfc3339(),
        });
        Ok(session)
    }

    /// Upload a file, reading each chunk with a freshly opened handle
    ///
    /// # Errors
    ///
    /// See [`UploadCoordinator::upload`].
    pub async fn upload_file(
        &mut self,
        session: &UploadSession,
        path: &Path,
    ) -> Result<UploadReport, Error> {
        self.upload(session, Payload::File(path.to_path_buf())).await
    }

    /// Upload an in-memory payload
    ///
    /// # Errors
    ///
    /// See [`UploadCoordinator::upload`].
    pub async fn upload_bytes(
        &mut self,
        session: &UploadSession,
        bytes: impl Into<Bytes>,
    ) -> Result<UploadReport, Error> {
        self.upload(session, Payload::Memory(bytes.into())).await
    }

    /// Write `payload` into an existing session
    ///
    /// Ends in `Completed` on `201 Created`, in `Expired` when the session
    /// deadline passes between chunks and in `Failed` otherwise. Server-side
    /// partial state is left alone; tear it down with
    /// [`UploadCoordinator::cancel_session`].
    ///
    /// # Errors
    ///
    /// Returns `SessionExpired`, `EmptyPayload`, `InvalidRange`, `Stalled`,
    /// `UnexpectedStatus` for any answer outside 201/202, or the network or
    /// I/O error that ended the upload.
    pub async fn upload(
        &mut self,
        session: &UploadSession,
        payload: Payload,
    ) -> Result<UploadReport, Error> {
        self.state = UploadState::Uploading;
        let mut progress = Progress::default();

        match self.drive(session, &payload, &mut progress).await {
            Ok(report) => {
                self.state = UploadState::Completed;
                Ok(report)
            }
            Err(Error::Transfer(TransferError::SessionExpired { expired_at })) => {
                self.state = UploadState::Expired;
                tracing::warn!(upload_url = %session.upload_url, offset = progress.offset, %expired_at, "upload session expired");
                self.tx.emit_upload(UploadEvent::Expired {
                    upload_url: session.upload_url.clone(),
                    offset: progress.offset,
                    expired_at: expired_at.clone(),
                });
                Err(TransferError::SessionExpired { expired_at }.into())
            }
            Err(err) => {
                self.state = UploadState::Failed;
                tracing::warn!(upload_url = %session.upload_url, offset = progress.offset, error = %err, "upload failed");
                self.tx.emit_upload(UploadEvent::Failed {
                    upload_url: session.upload_url.clone(),
                    offset: progress.offset,
                    failure: FailureContext::from_error(&err),
                });
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        session: &UploadSession,
        payload: &Payload,
        progress: &mut Progress,
    ) -> Result<UploadReport, Error> {
        validate_url(&session.upload_url)
            .map_err(|e| TransferError::InvalidSession(e.to_string()))?;

        let total = payload.size().await?;
        if total == 0 {
            return Err(TransferError::EmptyPayload.into());
        }
        let plan = ChunkPlan::new(total, self.options.chunk_size);
        let mut expires_at = session.expires_at;
        let mut stalled_rounds = 0u32;

        loop {
            check_expiry(expires_at, Utc::now())?;

            let range = plan.range_at(progress.offset).ok_or_else(|| {
                TransferError::InvalidRange(format!(
                    "offset {} outside {total} byte payload",
                    progress.offset
                ))
            })?;
            let body = payload.read(range).await?;
            tracing::debug!(upload_url = %session.upload_url, %range, "writing chunk");
            let response = self.put_chunk(&session.upload_url, range, body).await?;
            progress.chunks_sent += 1;

            match response.status() {
                StatusCode::CREATED => {
                    tracing::info!(upload_url = %session.upload_url, total, chunks = progress.chunks_sent, "upload completed");
                    self.tx.emit_upload(UploadEvent::Completed {
                        upload_url: session.upload_url.clone(),
                        total,
                        chunks_sent: progress.chunks_sent,
                    });
                    return Ok(UploadReport {
                        bytes: total,
                        chunks_sent: progress.chunks_sent,
                        state: UploadState::Completed,
                    });
                }
                // A single-range upload has nothing left to negotiate
                StatusCode::ACCEPTED if plan.is_chunked() => {
                    let info = AcceptedRangeInfo::parse(&read_text(response).await?)?;
                    let next = info.next_offset()?;
                    if next >= total {
                        return Err(TransferError::InvalidRange(format!(
                            "portal expects offset {next} of a {total} byte payload"
                        ))
                        .into());
                    }
                    if let Some(refreshed) = info.expires_at.filter(|r| *r != expires_at) {
                        expires_at = refreshed;
                        self.tx.emit_debug(
                            "upload session expiry extended",
                            BTreeMap::from([
                                ("upload_url".to_string(), session.upload_url.clone()),
                                ("expires_at".to_string(), expires_at.to_rfc3339()),
                            ]),
                        );
                    }

                    self.tx.emit_upload(UploadEvent::ChunkAccepted {
                        upload_url: session.upload_url.clone(),
                        from: range.from,
                        to: range.to,
                        total,
                        next_offset: next,
                    });

                    if next > progress.offset {
                        stalled_rounds = 0;
                    } else {
                        stalled_rounds += 1;
                        if stalled_rounds >= self.options.max_stalled_rounds {
                            return Err(TransferError::Stalled {
                                offset: next,
                                reason: format!(
                                    "portal requested offset {next} {stalled_rounds} times without progress"
                                ),
                            }
                            .into());
                        }
                    }
                    if next != range.next_offset() {
                        tracing::debug!(expected = range.next_offset(), declared = next, "portal moved the upload cursor");
                    }
                    progress.offset = next;
                }
                _ => return Err(unexpected_status("upload chunk", response).await),
            }
        }
    }

    async fn put_chunk(
        &self,
        upload_url: &str,
        range: ChunkRange,
        body: Bytes,
    ) -> Result<Response, Error> {
        let content_range = range.content_range();
        self.client
            .execute(upload_url, &self.tx, |client| {
                client
                    .put(upload_url)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .header(CONTENT_LENGTH, body.len())
                    .header(CONTENT_RANGE, content_range.as_str())
                    .body(body.clone())
            })
            .await
    }

    /// Delete the in-flight resource behind `session`
    ///
    /// A session the portal no longer knows (404) counts as cancelled.
    ///
    /// # Errors
    ///
    /// Returns a network error or `UnexpectedStatus` if the portal refuses.
    pub async fn cancel_session(&self, session: &UploadSession) -> Result<(), Error> {
        let url = session.upload_url.as_str();
        validate_url(url)?;
        let response = self
            .client
            .execute(url, &self.tx, |client| client.delete(url))
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            self.tx.emit_warning("upload session was already gone when cancelled", url);
        } else if !status.is_success() {
            return Err(unexpected_status("cancel upload session", response).await);
        }

        tracing::info!(upload_url = %url, "upload session cancelled");
        self.tx.emit_upload(UploadEvent::SessionCancelled {
            upload_url: session.upload_url.clone(),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Progress {
    offset: u64,
    chunks_sent: u32,
}

fn check_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), Error> {
    if now >= expires_at {
        return Err(TransferError::SessionExpired {
            expired_at: expires_at.to_rfc3339(),
        }
        .into());
    }
    Ok(())
}

async fn read_text(response: Response) -> Result<String, Error> {
    response
        .text()
        .await
        .map_err(|e| NetworkError::RequestFailed(e.to_string()).into())
}
