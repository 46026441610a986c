//! Archive Extraction Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The archive to extract does not exist.
    #[display("archive not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Reading the archive or writing into the destination failed.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// The archive is not a (compressed) tarball, or is truncated/corrupt.
    /// Download it again; extracting the same file will fail the same way.
    #[display("invalid archive: {}", _0.display())]
    InvalidArchive(#[error(not(source))] PathBuf),
    /// No bundle directory name can be derived from the archive's file name.
    #[display("cannot derive bundle name from: {}", _0.display())]
    InvalidName(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
