//! Streaming gzip encoder for upload bodies.

use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

/// Bytes pulled from the content store per encode step.
pub const INPUT_CHUNK_SIZE: usize = 4096;

/// Incremental gzip encoder.
///
/// `feed` accepts raw input and returns whatever encoded bytes are ready;
/// `finish` consumes the encoder and flushes the trailer, after which the
/// stream is exhausted. Abandoning an encoder mid-stream releases its state
/// on drop, so every exit path tears it down.
pub struct GzipStreamEncoder {
    inner: GzEncoder<Vec<u8>>,
    bytes_in: u64,
    bytes_out: u64,
}

impl GzipStreamEncoder {
    /// Fastest compression level; upload latency matters more than ratio.
    pub fn new() -> Self {
        Self {
            inner: GzEncoder::new(Vec::new(), Compression::fast()),
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Encode a chunk, returning zero or more output bytes. The encoder may
    /// buffer internally; an empty return is normal.
    pub fn feed(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        self.inner.write_all(chunk)?;
        self.bytes_in += chunk.len() as u64;
        let out = std::mem::take(self.inner.get_mut());
        self.bytes_out += out.len() as u64;
        Ok(out)
    }

    /// Flush remaining state and the gzip trailer.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        let GzipStreamEncoder {
            inner,
            bytes_in,
            bytes_out,
        } = self;
        let tail = inner.finish()?;
        tracing::debug!(
            bytes_in,
            bytes_out = bytes_out + tail.len() as u64,
            "Compressed upload stream finished"
        );
        Ok(tail)
    }
}

impl Default for GzipStreamEncoder {
    fn default() -> Self {
        Self::new()
    }
}
