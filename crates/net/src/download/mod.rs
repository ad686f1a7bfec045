//! Ranged download with resumption at the real write offset

mod config;
mod coordinator;
mod range;
mod stream;

pub use config::{DownloadOptions, DownloadReport};
pub use coordinator::DownloadCoordinator;
pub use range::{ContentRange, DownloadRangeInfo};
