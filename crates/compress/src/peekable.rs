//! Peekable readers for sniff-then-stream workflows.
//!
//! Thin convenience wrapper around standard library I/O primitives
//! ([`Read::take`], [`Cursor`], [`Chain`]).

use crate::error::{ErrorKind, Result};
use crate::{Compression, MAGIC_BYTES_LEN};
use exn::ResultExt;
use std::io::{Chain, Cursor, Read};
use tracing::instrument;

/// A resumable [`Read`]er: inspect the head of a stream, then hand the whole
/// stream (head included) onward via [`into_reader`](Self::into_reader).
pub struct PeekableReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> PeekableReader<R> {
    /// Wrap any reader for peeking.
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: Vec::new() }
    }

    /// Read up to `limit` bytes from the start of the stream.
    ///
    /// Successive calls do not accumulate:
    /// - `peek(4)` puts 4 bytes in the buffer, returns 4 bytes
    /// - `peek(8)` reads an additional 4 bytes, returns 8 bytes
    /// - `peek(2)` immediately returns 2 bytes (buffer already has 8)
    ///
    /// Returns fewer than `limit` bytes only when the stream ends first.
    pub fn peek(&mut self, limit: usize) -> Result<&[u8]> {
        if self.buffer.len() >= limit {
            return Ok(&self.buffer[..limit]);
        }
        let needed = (limit - self.buffer.len()) as u64;
        (&mut self.inner).take(needed).read_to_end(&mut self.buffer).or_raise(|| ErrorKind::Io)?;
        Ok(&self.buffer[..self.buffer.len().min(limit)])
    }

    /// Convert into a [`Read`]er that replays the buffered head, then
    /// streams the rest of the inner reader.
    pub fn into_reader(self) -> Chain<Cursor<Vec<u8>>, R> {
        Cursor::new(self.buffer).chain(self.inner)
    }
}

impl Compression {
    /// Detect the compression of a raw stream from its magic bytes and
    /// return the format alongside a reader yielding the decompressed stream.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use crc_compress::Compression;
    /// use std::fs::File;
    /// use std::io::BufReader;
    ///
    /// let file = BufReader::new(File::open("crc_libvirt_4.6.1.crcbundle").unwrap());
    /// let (format, tarball) = Compression::detect_reader(file).unwrap();
    /// println!("bundle is compressed with {format}");
    /// # drop(tarball);
    /// ```
    #[instrument(skip(reader))]
    pub fn detect_reader<'a, R: Read + 'a>(reader: R) -> Result<(Compression, Box<dyn Read + 'a>)> {
        let mut peekable = PeekableReader::new(reader);
        let format = Compression::from_magic_bytes(peekable.peek(MAGIC_BYTES_LEN)?);
        tracing::debug!(%format, "detected compression from magic bytes");
        Ok((format, format.wrap_reader(peekable.into_reader())?))
    }
}
