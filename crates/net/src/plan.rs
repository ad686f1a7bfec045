//! Chunk boundary planning
//!
//! Client and portal compute chunk boundaries independently, so the plan is a
//! pure function of `(size, chunk_size)`: no I/O, no hidden state, and the
//! same inputs always reproduce the same ranges.

use std::fmt;
use std::iter::FusedIterator;

/// Inclusive byte range `from..=to` of a payload that is `total` bytes long
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    pub from: u64,
    pub to: u64,
    pub total: u64,
}

impl ChunkRange {
    /// Number of bytes covered by the range
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.to - self.from + 1
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.to + 1 == self.total
    }

    /// Offset directly after this range
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.to + 1
    }

    /// Value for a `Content-Range` request header
    #[must_use]
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.from, self.to, self.total)
    }

    /// Value for a `Range` request header
    #[must_use]
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.from, self.to)
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}/{}", self.from, self.to, self.total)
    }
}

/// Deterministic chunk layout for a payload of `size` bytes
///
/// A `chunk_size` of 0 disables chunking, as does a payload that fits in a
/// single chunk; either way the plan holds one range covering everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    #[must_use]
    pub fn new(size: u64, chunk_size: u64) -> Self {
        Self { size, chunk_size }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Whether the payload is split into more than one range
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        self.chunk_size != 0 && self.size > self.chunk_size
    }

    fn step(&self) -> u64 {
        if self.is_chunked() {
            self.chunk_size
        } else {
            self.size
        }
    }

    /// Number of ranges, `ceil(size / chunk_size)`
    #[must_use]
    pub fn len(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.size.div_ceil(self.step())
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Range starting at an arbitrary offset
    ///
    /// The portal may ask us to resume anywhere; the range starting there uses
    /// the same chunk length as the regular plan, clipped to the payload end.
    #[must_use]
    pub fn range_at(&self, offset: u64) -> Option<ChunkRange> {
        if offset >= self.size {
            return None;
        }
        let len = self.step().min(self.size - offset);
        Some(ChunkRange {
            from: offset,
            to: offset + len - 1,
            total: self.size,
        })
    }

    /// Iterate the plan from the beginning
    #[must_use]
    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            offset: 0,
        }
    }
}

impl IntoIterator for ChunkPlan {
    type Item = ChunkRange;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for &ChunkPlan {
    type Item = ChunkRange;
    type IntoIter = ChunkIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the ranges of a [`ChunkPlan`]
#[derive(Debug, Clone)]
pub struct ChunkIter {
    plan: ChunkPlan,
    offset: u64,
}

impl Iterator for ChunkIter {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<Self::Item> {
        let range = self.plan.range_at(self.offset)?;
        self.offset = range.next_offset();
        Some(range)
    }
}

impl FusedIterator for ChunkIter {}
