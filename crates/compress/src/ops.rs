//! Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::{Compression as BzCompression, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::GzDecoder, write::GzEncoder};
use std::io::{Read, Write};
use tracing::instrument;
#[cfg(feature = "xz")]
use xz2::{read::XzDecoder, write::XzEncoder};
#[cfg(feature = "zstd")]
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

// Bundles are produced by a separate build pipeline; encoders here only exist
// for tooling and fixtures, so every format uses its library's default level.
#[cfg(feature = "xz")]
const XZ_LEVEL: u32 = 6;
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: i32 = 3;

impl Compression {
    /// Decompress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use crc_compress::Compression;
    /// use std::io::Write;
    ///
    /// let mut compressed = Vec::new();
    /// {
    ///     let mut writer = Compression::Gzip.wrap_writer(&mut compressed).unwrap();
    ///     writer.write_all(b"Hello, world!").unwrap();
    /// }
    /// let decompressed = Compression::Gzip.decompress(&compressed).unwrap();
    /// assert_eq!(decompressed, b"Hello, world!");
    /// ```
    #[instrument(skip(input), fields(format = %self, input_size = input.len()))]
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.wrap_reader(input)?.read_to_end(&mut output).or_raise(|| ErrorKind::InvalidData)?;
        Ok(output)
    }

    /// Wrap a reader with the appropriate decompression layer.
    ///
    /// Returns a boxed reader that automatically decompresses data. Corrupt
    /// input surfaces as an [`std::io::Error`] from the returned reader, not
    /// from this call (decoders are lazy).
    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            #[cfg(feature = "xz")]
            Compression::Xz => Box::new(XzDecoder::new(reader)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Encoder)?),
        })
    }

    /// Wrap a writer with the appropriate compression layer.
    ///
    /// The returned writer finishes the compressed stream when dropped.
    pub fn wrap_writer<'a, W: Write + 'a>(&self, writer: W) -> Result<Box<dyn Write + 'a>> {
        Ok(match self {
            Compression::None => Box::new(writer),
            Compression::Bzip2 => Box::new(BzEncoder::new(writer, BzCompression::default())),
            Compression::Gzip => Box::new(GzEncoder::new(writer, GzCompression::default())),
            #[cfg(feature = "xz")]
            Compression::Xz => Box::new(XzEncoder::new(writer, XZ_LEVEL)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                Box::new(ZstdEncoder::new(writer, ZSTD_LEVEL).or_raise(|| ErrorKind::Encoder)?.auto_finish())
            },
        })
    }
}
