//! Content extraction from PKCS#7 `SignedData` envelopes
//!
//! A grammar walk over one fixed envelope shape:
//!
//! ```text
//! ContentInfo SEQUENCE
//!   OID signedData
//!   [0]
//!     SignedData SEQUENCE
//!       INTEGER 1
//!       digestAlgorithms SET          skipped
//!       EncapsulatedContentInfo SEQUENCE
//!         OID data
//!         [0]
//!           OCTET STRING              copied out
//!           or
//!           [OCTET STRING, constructed]
//!             OCTET STRING ...        segments, copied out in order
//! ```
//!
//! Nothing after the content (certificates, signer infos) is read, and no
//! signature is checked.

use crate::cursor::{Length, ParseCursor};
use crate::search::ByteSearcher;
use edx_errors::{EnvelopeError, Error};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

/// 1.2.840.113549.1.7.2
pub const SIGNED_DATA_OID: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
/// 1.2.840.113549.1.7.1
pub const DATA_OID: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];

const SEQUENCE: u8 = 0x30;
const SET: u8 = 0x31;
const OBJECT_IDENTIFIER: u8 = 0x06;
const INTEGER: u8 = 0x02;
const OCTET_STRING: u8 = 0x04;
const CONSTRUCTED_OCTET_STRING: u8 = 0x24;
const CONTEXT_0: u8 = 0xa0;

const VERSION_1: [u8; 3] = [INTEGER, 0x01, 0x01];
const END_OF_CONTENTS: [u8; 2] = [0x00, 0x00];
const MAX_NESTING: u32 = 32;

/// Where the content sat in the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub content_offset: u64,
    pub content_length: u64,
    /// Content was terminated by an end-of-contents marker
    pub indefinite: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignatureExtractor {
    searcher: ByteSearcher,
}

impl SignatureExtractor {
    /// `search_buffer_size` bounds the buffer used to find the end of
    /// indefinite-length content
    #[must_use]
    pub fn new(search_buffer_size: usize) -> Self {
        Self {
            searcher: ByteSearcher::new(search_buffer_size),
        }
    }

    /// Copy the content of the envelope in `reader` to `writer`
    ///
    /// Fails closed: on any structural problem an error is returned and
    /// whatever already reached `writer` stays there.
    ///
    /// # Errors
    ///
    /// Returns an `EnvelopeError` for grammar violations, truncated input or
    /// a short copy, and `Error::Io` for read or write failures.
    pub fn extract<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<ExtractReport, Error>
    where
        R: Read + Seek,
        W: Write + ?Sized,
    {
        let mut cursor = ParseCursor::new(reader)?;

        cursor.expect_header(SEQUENCE, "ContentInfo SEQUENCE")?;
        expect_oid(&mut cursor, &SIGNED_DATA_OID, "signedData")?;
        cursor.expect_header(CONTEXT_0, "[0] content")?;
        cursor.expect_header(SEQUENCE, "SignedData SEQUENCE")?;
        expect_version(&mut cursor)?;
        skip_digest_algorithms(&mut cursor)?;

        cursor.expect_header(SEQUENCE, "EncapsulatedContentInfo SEQUENCE")?;
        expect_oid(&mut cursor, &DATA_OID, "data")?;
        cursor.expect_header(CONTEXT_0, "[0] eContent")?;
        let report = if cursor.peek_u8()? == CONSTRUCTED_OCTET_STRING {
            let wrapper =
                cursor.expect_header(CONSTRUCTED_OCTET_STRING, "constructed OCTET STRING")?;
            copy_segments(&mut cursor, wrapper, writer)?
        } else {
            let length = cursor.expect_header(OCTET_STRING, "OCTET STRING")?;
            self.copy_primitive(&mut cursor, length, writer)?
        };
        writer.flush()?;
        Ok(report)
    }

    fn copy_primitive<R, W>(
        &self,
        cursor: &mut ParseCursor<'_, R>,
        length: Length,
        writer: &mut W,
    ) -> Result<ExtractReport, Error>
    where
        R: Read + Seek,
        W: Write + ?Sized,
    {
        let content_offset = cursor.offset();
        let (content_length, indefinite) = match length {
            Length::Definite(len) => (len, false),
            Length::Indefinite => {
                let end = self
                    .searcher
                    .find(cursor.reader(), &END_OF_CONTENTS)?
                    .ok_or(EnvelopeError::TerminatorNotFound {
                        offset: content_offset,
                    })?;
                (end - content_offset, true)
            }
        };

        tracing::debug!(content_offset, content_length, indefinite, "copying envelope content");
        copy_exact(cursor, content_length, writer)?;
        Ok(ExtractReport {
            content_offset,
            content_length,
            indefinite,
        })
    }

    /// Extract the content of the envelope at `src` into `dest`
    ///
    /// The destination is created or truncated. After the copy its length on
    /// disk is compared with the content length; a partial destination is
    /// left behind on failure.
    ///
    /// # Errors
    ///
    /// See [`SignatureExtractor::extract`]; I/O errors carry the path involved.
    pub fn extract_file(&self, src: &Path, dest: &Path) -> Result<ExtractReport, Error> {
        let input = File::open(src).map_err(|e| Error::io_with_path(&e, src))?;
        let mut reader = BufReader::new(input);
        let output = File::create(dest).map_err(|e| Error::io_with_path(&e, dest))?;
        let mut writer = BufWriter::new(output);

        let report = self.extract(&mut reader, &mut writer)?;

        let output = writer
            .into_inner()
            .map_err(|e| Error::io_with_path(e.error(), dest))?;
        output
            .sync_all()
            .map_err(|e| Error::io_with_path(&e, dest))?;
        drop(output);

        let actual = fs::metadata(dest)
            .map_err(|e| Error::io_with_path(&e, dest))?
            .len();
        if actual != report.content_length {
            return Err(EnvelopeError::LengthMismatch {
                expected: report.content_length,
                actual,
            }
            .into());
        }
        Ok(report)
    }
}

/// Extract signed content from `src` into `dest` with default settings
///
/// # Errors
///
/// See [`SignatureExtractor::extract_file`].
pub fn extract_signed_content(src: &Path, dest: &Path) -> Result<ExtractReport, Error> {
    SignatureExtractor::default().extract_file(src, dest)
}

fn expect_oid<R: Read + Seek>(
    cursor: &mut ParseCursor<'_, R>,
    expected: &[u8],
    name: &str,
) -> Result<(), Error> {
    let length = cursor.expect_header(OBJECT_IDENTIFIER, "OBJECT IDENTIFIER")?;
    let at = cursor.offset();
    let mismatch = |found: String| -> Error {
        EnvelopeError::OidMismatch {
            offset: at,
            expected: format!("{name} ({})", hex::encode(expected)),
            found,
        }
        .into()
    };

    match length {
        Length::Definite(len) if len == expected.len() as u64 => {
            let found = cursor.read_bytes(expected.len())?;
            if found != expected {
                return Err(mismatch(hex::encode(found)));
            }
            Ok(())
        }
        Length::Definite(len) => Err(mismatch(format!("{len} byte identifier"))),
        Length::Indefinite => Err(mismatch("indefinite-length identifier".to_string())),
    }
}

/// Reassemble the primitive segments of a constructed OCTET STRING
///
/// Segments must have definite lengths. An indefinite wrapper ends at its
/// end-of-contents marker, a definite one exactly at its declared length.
fn copy_segments<R, W>(
    cursor: &mut ParseCursor<'_, R>,
    wrapper: Length,
    writer: &mut W,
) -> Result<ExtractReport, Error>
where
    R: Read + Seek,
    W: Write + ?Sized,
{
    let start = cursor.offset();
    let end = match wrapper {
        Length::Definite(len) => {
            if len > cursor.remaining() {
                return Err(EnvelopeError::Truncated {
                    offset: start + cursor.remaining(),
                }
                .into());
            }
            Some(start + len)
        }
        Length::Indefinite => None,
    };

    let mut content_offset = None;
    let mut content_length = 0u64;
    let mut segments = 0u32;
    loop {
        match end {
            Some(end) if cursor.offset() == end => break,
            Some(end) if cursor.offset() > end => {
                return Err(EnvelopeError::LengthMismatch {
                    expected: end - start,
                    actual: cursor.offset() - start,
                }
                .into());
            }
            None if cursor.take_end_of_contents()? => break,
            _ => {}
        }

        let header_at = cursor.offset();
        let len = match cursor.expect_header(OCTET_STRING, "OCTET STRING segment")? {
            Length::Definite(len) => len,
            Length::Indefinite => {
                return Err(EnvelopeError::UnsupportedLength {
                    offset: header_at + 1,
                    first_octet: 0x80,
                }
                .into());
            }
        };
        content_offset.get_or_insert(cursor.offset());
        copy_exact(cursor, len, writer)?;
        content_length += len;
        segments += 1;
    }

    tracing::debug!(segments, content_length, "reassembled segmented envelope content");
    Ok(ExtractReport {
        content_offset: content_offset.unwrap_or(start),
        content_length,
        indefinite: end.is_none(),
    })
}

/// Copy exactly `len` bytes or fail without claiming success
fn copy_exact<R, W>(cursor: &mut ParseCursor<'_, R>, len: u64, writer: &mut W) -> Result<(), Error>
where
    R: Read + Seek,
    W: Write + ?Sized,
{
    if len > cursor.remaining() {
        return Err(EnvelopeError::Truncated {
            offset: cursor.offset() + cursor.remaining(),
        }
        .into());
    }
    let copied = cursor.copy_to(len, writer)?;
    if copied != len {
        return Err(EnvelopeError::LengthMismatch {
            expected: len,
            actual: copied,
        }
        .into());
    }
    Ok(())
}

fn expect_version<R: Read + Seek>(cursor: &mut ParseCursor<'_, R>) -> Result<(), Error> {
    let at = cursor.offset();
    cursor.expect_tag(INTEGER, "version INTEGER")?;
    let found = cursor.read_bytes(VERSION_1.len() - 1)?;
    if found[..] != VERSION_1[1..] {
        return Err(EnvelopeError::VersionMismatch {
            offset: at,
            found: hex::encode(found),
        }
        .into());
    }
    Ok(())
}

fn skip_digest_algorithms<R: Read + Seek>(cursor: &mut ParseCursor<'_, R>) -> Result<(), Error> {
    match cursor.expect_header(SET, "digestAlgorithms SET")? {
        Length::Definite(len) => cursor.skip(len),
        // Walk element by element; a NULL parameter (05 00) next to the
        // marker would fool a plain search for 00 00
        Length::Indefinite => skip_to_end_of_contents(cursor, 1),
    }
}

fn skip_to_end_of_contents<R: Read + Seek>(
    cursor: &mut ParseCursor<'_, R>,
    depth: u32,
) -> Result<(), Error> {
    if depth > MAX_NESTING {
        return Err(EnvelopeError::NestingTooDeep {
            offset: cursor.offset(),
            limit: MAX_NESTING,
        }
        .into());
    }
    while !cursor.take_end_of_contents()? {
        cursor.read_tag()?;
        match cursor.read_length()? {
            Length::Definite(len) => cursor.skip(len)?,
            Length::Indefinite => skip_to_end_of_contents(cursor, depth + 1)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Smallest definite-length envelope around `abc`
    fn minimal() -> Vec<u8> {
        let mut bytes = vec![0x30, 0x80, 0x06, 0x09];
        bytes.extend_from_slice(&SIGNED_DATA_OID);
        bytes.extend_from_slice(&[0xa0, 0x80, 0x30, 0x80, 0x02, 0x01, 0x01, 0x31, 0x00]);
        bytes.extend_from_slice(&[0x30, 0x80, 0x06, 0x09]);
        bytes.extend_from_slice(&DATA_OID);
        bytes.extend_from_slice(&[0xa0, 0x05, 0x04, 0x03, b'a', b'b', b'c']);
        bytes
    }

    fn run(bytes: Vec<u8>) -> Result<(ExtractReport, Vec<u8>), Error> {
        let mut out = Vec::new();
        let report = SignatureExtractor::default().extract(&mut Cursor::new(bytes), &mut out)?;
        Ok((report, out))
    }

    #[test]
    fn test_minimal_envelope() {
        let (report, out) = run(minimal()).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(report.content_length, 3);
        assert_eq!(report.content_offset, minimal().len() as u64 - 3);
        assert!(!report.indefinite);
    }

    #[test]
    fn test_wrong_outer_tag() {
        let mut bytes = minimal();
        bytes[0] = 0x31;
        assert!(matches!(
            run(bytes),
            Err(Error::Envelope(EnvelopeError::UnexpectedTag { offset: 0, found: 0x31, .. }))
        ));
    }

    #[test]
    fn test_version_must_be_one() {
        let mut bytes = minimal();
        let at = 4 + 9 + 4 + 2; // past the [0] and SignedData headers, on the value
        assert_eq!(bytes[at], 0x01);
        bytes[at] = 0x03;
        assert!(matches!(
            run(bytes),
            Err(Error::Envelope(EnvelopeError::VersionMismatch { .. }))
        ));
    }

    #[test]
    fn test_version_must_be_an_integer() {
        let mut bytes = minimal();
        let at = 4 + 9 + 4;
        assert_eq!(bytes[at], INTEGER);
        bytes[at] = OCTET_STRING;
        assert!(matches!(
            run(bytes),
            Err(Error::Envelope(EnvelopeError::UnexpectedTag { offset: 17, found: 0x04, .. }))
        ));
    }

    #[test]
    fn test_short_oid_is_a_mismatch() {
        let mut bytes = vec![0x30, 0x80, 0x06, 0x03, 0x2a, 0x86, 0x48];
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            run(bytes),
            Err(Error::Envelope(EnvelopeError::OidMismatch { .. }))
        ));
    }

    #[test]
    fn test_runaway_nesting_is_bounded() {
        let mut bytes = vec![0x30, 0x80, 0x06, 0x09];
        bytes.extend_from_slice(&SIGNED_DATA_OID);
        bytes.extend_from_slice(&[0xa0, 0x80, 0x30, 0x80, 0x02, 0x01, 0x01, 0x31, 0x80]);
        for _ in 0..40 {
            bytes.extend_from_slice(&[0x30, 0x80]);
        }
        assert!(matches!(
            run(bytes),
            Err(Error::Envelope(EnvelopeError::NestingTooDeep { limit: 32, .. }))
        ));
    }
}
