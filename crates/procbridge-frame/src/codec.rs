use crate::error::{FrameError, Result};

/// Size of every control integer on the wire.
pub const INT_SIZE: usize = 4;

/// Size notification: size (4) + marker (1) = 5 bytes.
pub const NOTIFICATION_SIZE: usize = INT_SIZE + 1;

/// Marker byte: no further bytes follow for the current item.
pub const LAST_MARKER: u8 = 32;

/// Marker byte: more chunks follow for the current item.
pub const MORE_MARKER: u8 = 0;

/// Write `value` as 4 big-endian bytes at `offset`.
///
/// Panics if `buf` is shorter than `offset + 4`; callers size their buffers.
pub fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + INT_SIZE].copy_from_slice(&value.to_be_bytes());
}

/// Read 4 big-endian bytes at `offset` as a signed integer.
pub fn get_i32(buf: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; INT_SIZE];
    raw.copy_from_slice(&buf[offset..offset + INT_SIZE]);
    i32::from_be_bytes(raw)
}

/// Host-to-worker notification that a chunk is ready in the data buffer.
///
/// Wire format:
/// ```text
/// ┌───────────────┬─────────────┐
/// │ Size (4B BE)  │ Marker (1B) │
/// │ signed        │ 32 = last   │
/// └───────────────┴─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Number of bytes placed in the data buffer.
    pub size: usize,
    /// True when this is the final chunk of the current item.
    pub last: bool,
}

impl Notification {
    /// Create a notification for a chunk of `size` bytes.
    pub fn new(size: usize, last: bool) -> Self {
        Self { size, last }
    }

    /// Encode into the 5-byte wire form.
    pub fn encode(&self) -> Result<[u8; NOTIFICATION_SIZE]> {
        let size = i32::try_from(self.size).map_err(|_| FrameError::UnannounceableSize(self.size))?;
        let mut out = [0u8; NOTIFICATION_SIZE];
        put_i32(&mut out, 0, size);
        out[INT_SIZE] = if self.last { LAST_MARKER } else { MORE_MARKER };
        Ok(out)
    }

    /// Decode from the 5-byte wire form.
    ///
    /// Any marker value other than [`LAST_MARKER`] means "more to come".
    pub fn decode(raw: &[u8; NOTIFICATION_SIZE]) -> Result<Self> {
        let size = get_i32(raw, 0);
        let size = usize::try_from(size).map_err(|_| FrameError::InvalidSignal(size))?;
        Ok(Self {
            size,
            last: raw[INT_SIZE] == LAST_MARKER,
        })
    }
}
