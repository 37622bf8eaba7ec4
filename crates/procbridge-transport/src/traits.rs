use bytes::BytesMut;

use crate::error::Result;

/// Destination for outgoing chunk bytes.
///
/// Each call replaces the previous chunk; the peer learns the chunk length
/// from the size notification sent over the control channel.
pub trait ChunkSink {
    /// Publish `chunk` as the current chunk.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()>;
}

/// Source of incoming chunk bytes.
pub trait ChunkSource {
    /// Read the current chunk of `len` bytes, appending it to `dst`.
    fn read_chunk(&mut self, len: usize, dst: &mut BytesMut) -> Result<()>;
}

impl<T: ChunkSink + ?Sized> ChunkSink for &mut T {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        (**self).write_chunk(chunk)
    }
}

impl<T: ChunkSource + ?Sized> ChunkSource for &mut T {
    fn read_chunk(&mut self, len: usize, dst: &mut BytesMut) -> Result<()> {
        (**self).read_chunk(len, dst)
    }
}
