//! Decompression with automatic format detection for bundle archives.
//!
//! Bundles are tarballs, usually compressed, but their file extension
//! (`.crcbundle`) says nothing about *how* they were compressed. This crate
//! wraps the compression libraries behind a single [`Compression`] enum that
//! provides:
//!
//! - **Format detection** from magic bytes ([`Compression::from_magic_bytes`])
//!   or from file extensions ([`Compression::from_path`])
//! - **Streaming** via wrapped readers/writers ([`Compression::wrap_reader`],
//!   [`Compression::wrap_writer`])
//! - **Sniffing** via [`PeekableReader`]: read the first few raw bytes of a
//!   stream to detect its format, then replay them into the decoder
//!
//! Bzip2 and Gzip are always available. XZ and Zstd are behind feature flags.

mod construct;
pub mod error;
mod ops;
mod peekable;
mod util;

pub use crate::construct::MAGIC_BYTES_LEN;
pub use crate::peekable::PeekableReader;

/// A supported compression format.
///
/// Variants gated behind feature flags (`xz`, `zstd`) are only available when
/// the corresponding feature is enabled. Defaults to [`None`](Self::None)
/// (a plain, uncompressed tarball).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    #[cfg(feature = "xz")]
    Xz,
    /// Zstd compression (.zst)
    #[cfg(feature = "zstd")]
    Zstd,
}
