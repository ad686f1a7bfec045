#![deny(clippy::pedantic, unsafe_code)]

//! Signed-envelope handling for edx
//!
//! Documents come back from the portal wrapped in PKCS#7 `SignedData`. This
//! crate strips that envelope by walking its BER structure; verification and
//! decryption belong to the external signing tool.

mod cursor;
mod envelope;
mod search;

pub use cursor::{Length, ParseCursor};
pub use envelope::{
    extract_signed_content, ExtractReport, SignatureExtractor, DATA_OID, SIGNED_DATA_OID,
};
pub use search::ByteSearcher;
