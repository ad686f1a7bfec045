//! Ranged download state machine

use super::config::{DownloadOptions, DownloadReport};
use super::range::{ContentRange, DownloadRangeInfo};
use super::stream::{DestinationWriter, LockGuard};
use crate::client::NetClient;
use crate::error_body::unexpected_status;
use crate::plan::ChunkPlan;
use crate::validation::validate_url;
use edx_errors::{Error, TransferError};
use edx_events::{DownloadEvent, EventEmitter, EventSender, FailureContext};
use reqwest::header::RANGE;
use reqwest::{Response, StatusCode};
use std::path::Path;

/// Downloads a resource into a file, one range request at a time
///
/// Every continuation starts at the number of bytes actually on disk, so a
/// server that answers with shorter (or longer) ranges than requested never
/// causes a gap or an overlap.
#[derive(Clone)]
pub struct DownloadCoordinator {
    client: NetClient,
    tx: EventSender,
}

impl DownloadCoordinator {
    #[must_use]
    pub fn new(client: NetClient, tx: EventSender) -> Self {
        Self { client, tx }
    }

    /// Download `url` into `dest`
    ///
    /// Succeeds without touching the network when `dest` exists and
    /// `options.overwrite` is false. On failure the partial destination is
    /// left in place for the caller to inspect.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedStatus` for a first answer other than 200/206 or a
    /// continuation other than 206, `MissingContentRange`, `InvalidRange` for
    /// a continuation that does not line up, `Stalled` for an empty
    /// continuation, and any network or I/O error met on the way.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        options: &DownloadOptions,
    ) -> Result<DownloadReport, Error> {
        validate_url(url)?;

        if !options.overwrite {
            if let Ok(existing) = tokio::fs::metadata(dest).await {
                tracing::info!(%url, dest = %dest.display(), "destination exists, skipping download");
                self.tx.emit_download(DownloadEvent::Skipped {
                    url: url.to_string(),
                    dest: dest.display().to_string(),
                    existing_size: existing.len(),
                });
                return Ok(DownloadReport {
                    bytes: existing.len(),
                    ranges: 0,
                    skipped: true,
                });
            }
        }

        self.tx.emit_download(DownloadEvent::Started {
            url: url.to_string(),
            chunk_size: options.chunk_size,
        });

        let _lock = LockGuard::acquire(dest).await?;
        let mut writer = DestinationWriter::create(dest).await?;

        match self.fetch(url, options, &mut writer).await {
            Ok(ranges) => {
                let bytes = writer.finish().await?;
                tracing::info!(%url, bytes, ranges, "download completed");
                self.tx.emit_download(DownloadEvent::Completed {
                    url: url.to_string(),
                    total: bytes,
                    ranges,
                });
                Ok(DownloadReport {
                    bytes,
                    ranges,
                    skipped: false,
                })
            }
            Err(err) => {
                tracing::warn!(%url, bytes_written = writer.written(), error = %err, "download failed, partial output kept");
                self.tx.emit_download(DownloadEvent::Failed {
                    url: url.to_string(),
                    bytes_written: writer.written(),
                    failure: FailureContext::from_error(&err),
                });
                Err(err)
            }
        }
    }

    /// Returns the number of responses written
    async fn fetch(
        &self,
        url: &str,
        options: &DownloadOptions,
        writer: &mut DestinationWriter,
    ) -> Result<u32, Error> {
        let first_range = (options.chunk_size > 0).then(|| format!("bytes=0-{}", options.chunk_size - 1));
        let response = self.get(url, first_range.as_deref()).await?;

        match response.status() {
            StatusCode::OK => {
                if first_range.is_some() {
                    tracing::warn!(%url, "server ignored the range request");
                    self.tx.emit_warning(
                        "server ignored the range request, receiving the whole body",
                        url,
                    );
                }
                writer.append(url, response, options.chunk_timeout).await?;
                writer.verify().await?;
                Ok(1)
            }
            StatusCode::PARTIAL_CONTENT => {
                let first = ContentRange::from_headers(response.headers())?;
                let info = DownloadRangeInfo::new(&first);
                info.check_continuation(0, &first)?;
                self.receive(url, response, first, writer, options).await?;
                self.continue_ranges(url, info, options, writer).await
            }
            _ => Err(unexpected_status("download", response).await),
        }
    }

    async fn continue_ranges(
        &self,
        url: &str,
        info: DownloadRangeInfo,
        options: &DownloadOptions,
        writer: &mut DestinationWriter,
    ) -> Result<u32, Error> {
        let total = info.total_length;
        let plan = ChunkPlan::new(total, options.chunk_size);
        let mut ranges = 1u32;

        while writer.written() < total {
            let offset = writer.written();
            let Some(next) = plan.range_at(offset) else {
                break;
            };
            tracing::debug!(%url, range = %next, "requesting continuation");
            let response = self.get(url, Some(&next.range_header())).await?;
            if response.status() != StatusCode::PARTIAL_CONTENT {
                return Err(unexpected_status("download continuation", response).await);
            }

            let got = ContentRange::from_headers(response.headers())?;
            info.check_continuation(offset, &got)?;
            self.receive(url, response, got, writer, options).await?;
            ranges += 1;
        }

        Ok(ranges)
    }

    /// Append one partial body and re-check the file against the offset
    async fn receive(
        &self,
        url: &str,
        response: Response,
        declared: ContentRange,
        writer: &mut DestinationWriter,
        options: &DownloadOptions,
    ) -> Result<(), Error> {
        let from = writer.written();
        let appended = writer.append(url, response, options.chunk_timeout).await?;
        if appended == 0 {
            return Err(TransferError::Stalled {
                offset: from,
                reason: format!("server sent an empty body for {declared}"),
            }
            .into());
        }
        writer.verify().await?;

        if writer.written() > declared.total {
            return Err(TransferError::InvalidRange(format!(
                "received {} bytes of a {} byte resource",
                writer.written(),
                declared.total
            ))
            .into());
        }
        if appended != declared.len() {
            tracing::debug!(%url, declared = %declared, appended, "body length differs from Content-Range");
        }

        self.tx.emit_download(DownloadEvent::RangeReceived {
            url: url.to_string(),
            from,
            to: writer.written() - 1,
            total: declared.total,
        });
        Ok(())
    }

    async fn get(&self, url: &str, range: Option<&str>) -> Result<Response, Error> {
        self.client
            .execute(url, &self.tx, |client| {
                let request = client.get(url);
                match range {
                    Some(range) => request.header(RANGE, range),
                    None => request,
                }
            })
            .await
    }
}
