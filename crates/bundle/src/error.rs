//! Bundle Repository Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Every kind carries the path it concerns; the underlying
//! filesystem, JSON or extraction error is kept as a child in the error tree.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A bundle repository error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for bundle repository operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bundle has no directory in the cache. Download and extract it.
    #[display("bundle not found in cache: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The bundle directory exists but its metadata file could not be read.
    #[display("could not read bundle metadata: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// The metadata file does not match the expected schema. Re-extract the
    /// bundle (or fix the file); reading it again will fail the same way.
    #[display("invalid bundle metadata: {}", _0.display())]
    Parse(#[error(not(source))] PathBuf),
    /// The directory the executable is exposed in could not be created.
    #[display("could not create directory: {}", _0.display())]
    DirCreate(#[error(not(source))] PathBuf),
    /// The bundled executable could not be exposed at this path.
    #[display("could not publish executable: {}", _0.display())]
    Publish(#[error(not(source))] PathBuf),
    /// Extracting this archive into the cache failed.
    #[display("could not extract bundle archive: {}", _0.display())]
    Extraction(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::DirCreate(_) | Self::Publish(_))
    }
}
