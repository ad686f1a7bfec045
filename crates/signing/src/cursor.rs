//! Forward-only reader with BER tag and length decoding

use edx_errors::{EnvelopeError, Error};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Decoded BER length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Definite(u64),
    /// Content ends at a `00 00` end-of-contents marker
    Indefinite,
}

/// Read position over an envelope, owned by one extraction
///
/// Offsets are absolute stream positions and end up in every structural
/// error, so a failure points at the offending byte.
pub struct ParseCursor<'a, R> {
    reader: &'a mut R,
    offset: u64,
    end: u64,
}

impl<'a, R: Read + Seek> ParseCursor<'a, R> {
    /// Start at the reader's current position
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the stream cannot be measured.
    pub fn new(reader: &'a mut R) -> Result<Self, Error> {
        let offset = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            reader,
            offset,
            end,
        })
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes left before the end of the stream
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.offset)
    }

    pub(crate) fn reader(&mut self) -> &mut R {
        &mut *self.reader
    }

    /// # Errors
    ///
    /// Returns `Truncated` at the end of the stream.
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        self.read_into(&mut byte)?;
        Ok(byte[0])
    }

    /// # Errors
    ///
    /// Returns `Truncated` if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        if len as u64 > self.remaining() {
            return Err(self.truncated());
        }
        let mut buf = vec![0u8; len];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(self.truncated()),
            Err(e) => Err(e.into()),
        }
    }

    /// Advance past `len` bytes without reading them
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the stream ends first.
    pub fn skip(&mut self, len: u64) -> Result<(), Error> {
        if len > self.remaining() {
            return Err(self.truncated());
        }
        self.seek_to(self.offset + len)
    }

    /// Jump to an absolute position at or after the current one
    ///
    /// # Errors
    ///
    /// Returns `Truncated` for a position beyond the end of the stream.
    pub fn seek_to(&mut self, position: u64) -> Result<(), Error> {
        if position > self.end {
            return Err(self.truncated());
        }
        self.reader.seek(SeekFrom::Start(position))?;
        self.offset = position;
        Ok(())
    }

    /// Read a tag and check it against `expected`
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedTag` naming `what` on a mismatch.
    pub fn expect_tag(&mut self, expected: u8, what: &str) -> Result<(), Error> {
        let at = self.offset;
        let found = self.read_u8()?;
        if found != expected {
            return Err(EnvelopeError::UnexpectedTag {
                offset: at,
                expected: format!("{what} (0x{expected:02x})"),
                found,
            }
            .into());
        }
        Ok(())
    }

    /// Read a tag that may use the high-tag-number form
    ///
    /// Only the leading octet is returned; continuation octets are consumed.
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if the stream ends inside the tag.
    pub fn read_tag(&mut self) -> Result<u8, Error> {
        let first = self.read_u8()?;
        if first & 0x1f == 0x1f {
            while self.read_u8()? & 0x80 != 0 {}
        }
        Ok(first)
    }

    /// Decode a BER length
    ///
    /// `0x00..=0x7f` is the length itself, `0x80` is indefinite and
    /// `0x81..=0x84` announce 1 to 4 big-endian length octets.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedLength` for `0x85..=0xff` and `Truncated` if the
    /// length octets are cut off.
    pub fn read_length(&mut self) -> Result<Length, Error> {
        let at = self.offset;
        let first = self.read_u8()?;
        match first {
            0x00..=0x7f => Ok(Length::Definite(u64::from(first))),
            0x80 => Ok(Length::Indefinite),
            0x81..=0x84 => {
                let count = usize::from(first & 0x7f);
                let octets = self.read_bytes(count)?;
                Ok(Length::Definite(
                    octets
                        .iter()
                        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
                ))
            }
            _ => Err(EnvelopeError::UnsupportedLength {
                offset: at,
                first_octet: first,
            }
            .into()),
        }
    }

    /// Copy up to `len` bytes from the current position into `writer`
    ///
    /// Returns how many bytes were copied, which is short only when the
    /// stream ends early.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by either side.
    pub fn copy_to<W: Write + ?Sized>(&mut self, len: u64, writer: &mut W) -> Result<u64, Error> {
        let copied = io::copy(&mut (&mut *self.reader).take(len), writer)?;
        self.offset += copied;
        Ok(copied)
    }

    /// Expected tag followed by its length
    ///
    /// # Errors
    ///
    /// See [`ParseCursor::expect_tag`] and [`ParseCursor::read_length`].
    pub fn expect_header(&mut self, tag: u8, what: &str) -> Result<Length, Error> {
        self.expect_tag(tag, what)?;
        self.read_length()
    }

    /// Peek at the next byte without consuming it
    ///
    /// # Errors
    ///
    /// Returns `Truncated` at the end of the stream.
    pub fn peek_u8(&mut self) -> Result<u8, Error> {
        let at = self.offset;
        let byte = self.read_u8()?;
        self.seek_to(at)?;
        Ok(byte)
    }

    /// Consume an end-of-contents marker if one is next
    ///
    /// # Errors
    ///
    /// Returns `Truncated` if fewer than two bytes remain.
    pub fn take_end_of_contents(&mut self) -> Result<bool, Error> {
        let at = self.offset;
        let pair = self.read_bytes(2)?;
        if pair == [0u8, 0] {
            return Ok(true);
        }
        self.seek_to(at)?;
        Ok(false)
    }

    /// Build a `Truncated` error at the current offset
    #[must_use]
    pub fn truncated(&self) -> Error {
        EnvelopeError::Truncated {
            offset: self.offset,
        }
        .into()
    }
}
