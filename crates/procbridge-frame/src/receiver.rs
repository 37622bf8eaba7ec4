use bytes::BytesMut;
use procbridge_transport::ChunkSource;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::record::RecordDecoder;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reads announced chunks and decodes them into records.
///
/// Bytes that do not yet form a complete record stay buffered until the
/// next chunk arrives, so a record may span several announced payloads.
pub struct Receiver<D, S> {
    decoder: D,
    source: Option<S>,
    buf: BytesMut,
}

impl<D: RecordDecoder, S: ChunkSource> Receiver<D, S> {
    /// Create a receiver reading chunks from `source`.
    pub fn new(decoder: D, source: S) -> Self {
        Self {
            decoder,
            source: Some(source),
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Read exactly `size` bytes and emit every complete record they finish.
    ///
    /// Returns the number of records emitted, which may be zero.
    pub fn collect_buffer<F>(&mut self, size: usize, mut emit: F) -> Result<usize>
    where
        F: FnMut(D::Item),
    {
        let source = self.source.as_mut().ok_or(FrameError::Closed)?;
        source.read_chunk(size, &mut self.buf)?;

        let mut emitted = 0usize;
        while let Some(record) = self.decoder.decode(&mut self.buf)? {
            emit(record);
            emitted += 1;
        }

        trace!(size, emitted, pending = self.buf.len(), "collected chunk");
        Ok(emitted)
    }
}

impl<D, S> Receiver<D, S> {
    /// Bytes received but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Release the source. Safe to call more than once.
    pub fn close(&mut self) {
        self.source = None;
        self.buf.clear();
    }

    /// Whether the source has been released.
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;

    use super::*;
    use crate::record::{RawRecordCodec, RecordEncoder};

    struct QueuedChunks {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ChunkSource for QueuedChunks {
        fn read_chunk(&mut self, len: usize, dst: &mut BytesMut) -> procbridge_transport::Result<()> {
            let chunk = self.chunks.pop_front().unwrap_or_default();
            assert_eq!(chunk.len(), len, "announced size must match chunk");
            dst.extend_from_slice(&chunk);
            Ok(())
        }
    }

    fn encoded(records: &[&str]) -> Vec<u8> {
        let mut codec = RawRecordCodec::new();
        let mut wire = BytesMut::new();
        for record in records {
            codec.encode(*record, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[test]
    fn single_chunk_with_batch_of_records() {
        let chunk = encoded(&["x", "yy", "zzz"]);
        let len = chunk.len();
        let source = QueuedChunks {
            chunks: VecDeque::from(vec![chunk]),
        };
        let mut receiver = Receiver::new(RawRecordCodec::new(), source);

        let mut out = Vec::new();
        let emitted = receiver.collect_buffer(len, |r| out.push(r)).unwrap();

        assert_eq!(emitted, 3);
        assert_eq!(out, vec![
            Bytes::from_static(b"x"),
            Bytes::from_static(b"yy"),
            Bytes::from_static(b"zzz"),
        ]);
        assert_eq!(receiver.pending(), 0);
    }

    #[test]
    fn record_split_across_chunks_emits_once_complete() {
        let wire = encoded(&["split-record"]);
        let (head, tail) = wire.split_at(7);
        let source = QueuedChunks {
            chunks: VecDeque::from(vec![head.to_vec(), tail.to_vec()]),
        };
        let mut receiver = Receiver::new(RawRecordCodec::new(), source);

        let mut out = Vec::new();
        assert_eq!(receiver.collect_buffer(7, |r| out.push(r)).unwrap(), 0);
        assert_eq!(receiver.pending(), 7);

        assert_eq!(
            receiver
                .collect_buffer(wire.len() - 7, |r| out.push(r))
                .unwrap(),
            1
        );
        assert_eq!(out, vec![Bytes::from_static(b"split-record")]);
        assert_eq!(receiver.pending(), 0);
    }

    #[test]
    fn closed_receiver_refuses_to_read() {
        let source = QueuedChunks {
            chunks: VecDeque::new(),
        };
        let mut receiver = Receiver::new(RawRecordCodec::new(), source);
        receiver.close();
        receiver.close();
        assert!(receiver.is_closed());

        let err = receiver.collect_buffer(4, |_| {}).unwrap_err();
        assert!(matches!(err, FrameError::Closed));
    }
}
