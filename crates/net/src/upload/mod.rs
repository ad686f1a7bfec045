//! Chunked, server-negotiated upload protocol
//!
//! A session is requested first; the payload is then written range by range
//! with `Content-Range` headers. The portal answers `202 Accepted` with the
//! range it expects next or `201 Created` once the resource is complete.

mod coordinator;
mod payload;
mod session;

pub use coordinator::{UploadCoordinator, UploadOptions, UploadReport, UploadState};
pub use payload::Payload;
pub use session::{AcceptedRangeInfo, UploadSession};
