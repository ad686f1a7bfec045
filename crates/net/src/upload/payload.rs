//! Sources an upload reads its chunks from

use crate::plan::ChunkRange;
use bytes::Bytes;
use edx_errors::Error;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Upload payload
#[derive(Debug, Clone)]
pub enum Payload {
    /// Read chunk by chunk; the file is opened per chunk and closed right after
    File(PathBuf),
    Memory(Bytes),
}

impl Payload {
    /// Total payload size in bytes
    ///
    /// # Errors
    ///
    /// Returns an I/O error carrying the path if the file cannot be inspected.
    pub async fn size(&self) -> Result<u64, Error> {
        match self {
            Self::File(path) => tokio::fs::metadata(path)
                .await
                .map(|m| m.len())
                .map_err(|e| Error::io_with_path(&e, path)),
            Self::Memory(bytes) => Ok(bytes.len() as u64),
        }
    }

    /// Bytes covered by `range`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file is shorter than the range.
    pub async fn read(&self, range: ChunkRange) -> Result<Bytes, Error> {
        match self {
            Self::File(path) => read_file_range(path, range).await,
            Self::Memory(bytes) => {
                let from = usize::try_from(range.from).map_err(|_| Error::internal("offset overflow"))?;
                let to = usize::try_from(range.to).map_err(|_| Error::internal("offset overflow"))?;
                if to >= bytes.len() {
                    return Err(Error::internal(format!(
                        "range {range} outside {} byte payload",
                        bytes.len()
                    )));
                }
                Ok(bytes.slice(from..=to))
            }
        }
    }
}

async fn read_file_range(path: &Path, range: ChunkRange) -> Result<Bytes, Error> {
    let len = usize::try_from(range.len()).map_err(|_| Error::internal("chunk too large"))?;
    let mut file = File::open(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    file.seek(SeekFrom::Start(range.from))
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    Ok(Bytes::from(buffer))
}
