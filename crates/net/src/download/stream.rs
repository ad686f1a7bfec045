//! Streaming response bodies into the destination file

use edx_errors::{Error, NetworkError, TransferError};
use futures::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// RAII guard for the download lock file; removed on drop
pub(super) struct LockGuard {
    path: PathBuf,
    _file: File,
}

impl LockGuard {
    /// Take the lock next to `dest`, creating missing parent directories
    pub(super) async fn acquire(dest: &Path) -> Result<Self, Error> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let path = lock_path(dest);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true) // Atomic - fails if file already exists
            .open(&path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    let busy = std::io::Error::new(
                        e.kind(),
                        format!("{} is already being downloaded", dest.display()),
                    );
                    Error::io_with_path(&busy, &path)
                } else {
                    Error::io_with_path(&e, &path)
                }
            })?;

        Ok(Self { path, _file: file })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Best-effort cleanup - ignore errors
        let _ = std::fs::remove_file(&self.path);
    }
}

fn lock_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map_or_else(|| OsString::from("download"), ToOwned::to_owned);
    name.push(".lock");
    dest.with_file_name(name)
}

/// Append-only writer that knows how many bytes it has put on disk
pub(super) struct DestinationWriter {
    path: PathBuf,
    file: File,
    written: u64,
}

impl DestinationWriter {
    /// Create (or truncate) the destination; its directory must exist
    pub(super) async fn create(path: &Path) -> Result<Self, Error> {
        let file = File::create(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: 0,
        })
    }

    /// Current write offset
    pub(super) fn written(&self) -> u64 {
        self.written
    }

    /// Stream a response body to the end of the file
    ///
    /// Returns the number of bytes appended. Each piece of the body must
    /// arrive within `chunk_timeout`.
    pub(super) async fn append(
        &mut self,
        url: &str,
        response: reqwest::Response,
        chunk_timeout: Duration,
    ) -> Result<u64, Error> {
        let mut stream = response.bytes_stream();
        let mut appended = 0u64;

        loop {
            match tokio::time::timeout(chunk_timeout, stream.next()).await {
                Ok(Some(chunk)) => {
                    let chunk = chunk.map_err(|e| NetworkError::RequestFailed(e.to_string()))?;
                    self.file
                        .write_all(&chunk)
                        .await
                        .map_err(|e| Error::io_with_path(&e, &self.path))?;
                    appended += chunk.len() as u64;
                    self.written += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(_) => {
                    return Err(NetworkError::Timeout {
                        url: url.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(appended)
    }

    /// Flush and compare the on-disk length with the tracked offset
    pub(super) async fn verify(&mut self) -> Result<u64, Error> {
        self.file
            .flush()
            .await
            .map_err(|e| Error::io_with_path(&e, &self.path))?;
        let actual = self
            .file
            .metadata()
            .await
            .map_err(|e| Error::io_with_path(&e, &self.path))?
            .len();
        if actual != self.written {
            return Err(TransferError::LengthMismatch {
                expected: self.written,
                actual,
            }
            .into());
        }
        Ok(actual)
    }

    /// Flush to stable storage and close the handle
    pub(super) async fn finish(mut self) -> Result<u64, Error> {
        let len = self.verify().await?;
        self.file
            .sync_all()
            .await
            .map_err(|e| Error::io_with_path(&e, &self.path))?;
        Ok(len)
    }
}
