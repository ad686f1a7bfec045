//! Streaming sub-sequence search

use std::io::{self, Read, Seek, SeekFrom};

/// Finds a byte pattern in a seekable stream with a bounded buffer
///
/// The buffer holds at least twice the needle. Between refills the last
/// `needle.len() - 1` bytes are carried over so a match straddling two
/// refills is still seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSearcher {
    buffer_size: usize,
}

impl Default for ByteSearcher {
    fn default() -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ByteSearcher {
    pub const DEFAULT_BUFFER_SIZE: usize = 4096;

    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Absolute stream position of the first `needle` at or after the current
    /// position
    ///
    /// The source is left where it was when the search started, whether or
    /// not a match was found.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading or seeking the source.
    pub fn find<R: Read + Seek>(&self, source: &mut R, needle: &[u8]) -> io::Result<Option<u64>> {
        let start = source.stream_position()?;
        let found = self.scan(source, needle, start);
        source.seek(SeekFrom::Start(start))?;
        found
    }

    fn scan<R: Read>(&self, source: &mut R, needle: &[u8], start: u64) -> io::Result<Option<u64>> {
        if needle.is_empty() {
            return Ok(Some(start));
        }

        let carry = needle.len() - 1;
        let mut buffer = vec![0u8; self.buffer_size.max(needle.len() * 2)];
        let mut filled = 0usize;
        // Stream position of buffer[0]
        let mut base = start;

        loop {
            let read = fill(source, &mut buffer[filled..])?;
            if read == 0 {
                return Ok(None);
            }
            filled += read;

            if let Some(index) = position(&buffer[..filled], needle) {
                return Ok(Some(base + index as u64));
            }

            let kept = carry.min(filled);
            buffer.copy_within(filled - kept..filled, 0);
            base += (filled - kept) as u64;
            filled = kept;
        }
    }
}

/// Read until `buf` is full or the source ends
fn fill<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn position(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
