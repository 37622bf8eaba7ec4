use bytes::BytesMut;
use procbridge_transport::ChunkSink;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::record::RecordEncoder;
use crate::signal::Group;

const INITIAL_SCRATCH_CAPACITY: usize = 8 * 1024;

/// Serializes outgoing records into bounded chunks.
///
/// A record that does not fit into the remainder of a chunk is split: the
/// head goes out with the current chunk, the tail is carried over per group
/// and leads the next chunk for that group.
pub struct Sender<E, S> {
    encoder: E,
    sink: Option<S>,
    capacity: usize,
    chunk: BytesMut,
    scratch: BytesMut,
    carry: [BytesMut; 2],
}

impl<E, S: ChunkSink> Sender<E, S> {
    /// Create a sender writing chunks of at most `capacity` bytes to `sink`.
    ///
    /// A zero capacity is raised to one byte.
    pub fn new(encoder: E, sink: S, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            encoder,
            sink: Some(sink),
            capacity,
            chunk: BytesMut::with_capacity(capacity.min(INITIAL_SCRATCH_CAPACITY)),
            scratch: BytesMut::with_capacity(INITIAL_SCRATCH_CAPACITY),
            carry: [BytesMut::new(), BytesMut::new()],
        }
    }

    /// Send a single record as its own chunk.
    ///
    /// The record must fit into one chunk.
    pub fn send_record<T: ?Sized>(&mut self, record: &T) -> Result<usize>
    where
        E: RecordEncoder<T>,
    {
        self.scratch.clear();
        self.encoder.encode(record, &mut self.scratch)?;
        if self.scratch.len() > self.capacity {
            return Err(FrameError::RecordTooLarge {
                size: self.scratch.len(),
                max: self.capacity,
            });
        }

        let sink = self.sink.as_mut().ok_or(FrameError::Closed)?;
        sink.write_chunk(&self.scratch)?;
        trace!(size = self.scratch.len(), "sent single record");
        Ok(self.scratch.len())
    }

    /// Fill one chunk for `group`, resuming any carry-over before pulling
    /// new records from `records`.
    ///
    /// Returns the number of bytes written to the sink.
    pub fn send_buffer<I, T>(&mut self, records: &mut I, group: Group) -> Result<usize>
    where
        I: Iterator<Item = T>,
        E: RecordEncoder<T>,
    {
        let sink = self.sink.as_mut().ok_or(FrameError::Closed)?;
        let carry = &mut self.carry[group.index()];
        self.chunk.clear();

        if !carry.is_empty() {
            let take = carry.len().min(self.capacity);
            self.chunk.extend_from_slice(&carry.split_to(take));
        }

        let mut pulled = 0usize;
        while carry.is_empty() && self.chunk.len() < self.capacity {
            let Some(record) = records.next() else {
                break;
            };
            pulled += 1;

            self.scratch.clear();
            self.encoder.encode(&record, &mut self.scratch)?;

            let room = self.capacity - self.chunk.len();
            if self.scratch.len() <= room {
                self.chunk.extend_from_slice(&self.scratch);
            } else {
                self.chunk.extend_from_slice(&self.scratch[..room]);
                carry.extend_from_slice(&self.scratch[room..]);
            }
        }

        sink.write_chunk(&self.chunk)?;
        trace!(
            group = group.index(),
            size = self.chunk.len(),
            pulled,
            carry = carry.len(),
            "sent chunk"
        );
        Ok(self.chunk.len())
    }
}

impl<E, S> Sender<E, S> {
    /// Whether the last call for `group` left part of a record unsent.
    pub fn has_remaining(&self, group: Group) -> bool {
        !self.carry[group.index()].is_empty()
    }

    /// Drop all carry-over state.
    pub fn reset(&mut self) {
        for carry in &mut self.carry {
            carry.clear();
        }
    }

    /// Release the sink. Safe to call more than once.
    pub fn close(&mut self) {
        self.sink = None;
        self.reset();
    }

    /// Whether the sink has been released.
    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Borrow the sink, if still open.
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }
}
