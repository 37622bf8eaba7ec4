//! Signal codes read from the control channel.
//!
//! Values `0` through `-4` are reserved control codes. Any positive value
//! announces a payload of that many bytes. The wire format itself does not
//! disambiguate the two: a payload of exactly 0 bytes would read as a buffer
//! request, so such payloads are never announced.

use crate::codec::{get_i32, put_i32, INT_SIZE};
use crate::error::{FrameError, Result};

/// Plain buffer request (non-grouped mode).
pub const SIGNAL_BUFFER_REQUEST: i32 = 0;

/// The worker finished normally.
pub const SIGNAL_FINISHED: i32 = -1;

/// The worker failed; a diagnostic follows on its side channel.
pub const SIGNAL_ERROR: i32 = -2;

/// Buffer request for group 0.
pub const SIGNAL_BUFFER_REQUEST_G0: i32 = -3;

/// Buffer request for group 1.
pub const SIGNAL_BUFFER_REQUEST_G1: i32 = -4;

/// One of the two input streams of a co-grouped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    First,
    Second,
}

impl Group {
    /// Slot index (0 or 1).
    pub fn index(self) -> usize {
        match self {
            Group::First => 0,
            Group::Second => 1,
        }
    }

    /// Wire code of a buffer request for this group.
    pub fn request_code(self) -> i32 {
        match self {
            Group::First => SIGNAL_BUFFER_REQUEST_G0,
            Group::Second => SIGNAL_BUFFER_REQUEST_G1,
        }
    }
}

/// A reserved control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCode {
    BufferRequest,
    GroupRequest(Group),
    Finished,
    Error,
}

impl ControlCode {
    pub fn code(self) -> i32 {
        match self {
            ControlCode::BufferRequest => SIGNAL_BUFFER_REQUEST,
            ControlCode::GroupRequest(group) => group.request_code(),
            ControlCode::Finished => SIGNAL_FINISHED,
            ControlCode::Error => SIGNAL_ERROR,
        }
    }
}

/// A decoded 4-byte signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Control(ControlCode),
    PayloadSize(usize),
}

impl Signal {
    /// Interpret a raw wire value.
    pub fn from_wire(value: i32) -> Result<Self> {
        let signal = match value {
            SIGNAL_BUFFER_REQUEST => Signal::Control(ControlCode::BufferRequest),
            SIGNAL_FINISHED => Signal::Control(ControlCode::Finished),
            SIGNAL_ERROR => Signal::Control(ControlCode::Error),
            SIGNAL_BUFFER_REQUEST_G0 => Signal::Control(ControlCode::GroupRequest(Group::First)),
            SIGNAL_BUFFER_REQUEST_G1 => Signal::Control(ControlCode::GroupRequest(Group::Second)),
            size if size > 0 => Signal::PayloadSize(size as usize),
            other => return Err(FrameError::InvalidSignal(other)),
        };
        Ok(signal)
    }

    /// Raw wire value of this signal.
    ///
    /// A zero-length payload or one beyond `i32::MAX` cannot be announced.
    pub fn to_wire(self) -> Result<i32> {
        match self {
            Signal::Control(code) => Ok(code.code()),
            Signal::PayloadSize(0) => Err(FrameError::UnannounceableSize(0)),
            Signal::PayloadSize(size) => {
                i32::try_from(size).map_err(|_| FrameError::UnannounceableSize(size))
            }
        }
    }

    /// Decode from a 4-byte datagram.
    pub fn decode(raw: &[u8; INT_SIZE]) -> Result<Self> {
        Self::from_wire(get_i32(raw, 0))
    }

    /// Encode into a 4-byte datagram.
    pub fn encode(self) -> Result<[u8; INT_SIZE]> {
        let mut out = [0u8; INT_SIZE];
        put_i32(&mut out, 0, self.to_wire()?);
        Ok(out)
    }
}

/// Returns a human-readable name for a raw signal value.
pub fn signal_name(value: i32) -> &'static str {
    match value {
        SIGNAL_BUFFER_REQUEST => "BUFFER_REQUEST",
        SIGNAL_FINISHED => "FINISHED",
        SIGNAL_ERROR => "ERROR",
        SIGNAL_BUFFER_REQUEST_G0 => "BUFFER_REQUEST_G0",
        SIGNAL_BUFFER_REQUEST_G1 => "BUFFER_REQUEST_G1",
        v if v > 0 => "PAYLOAD_SIZE",
        _ => "INVALID",
    }
}

/// Returns true if the value is one of the reserved control codes.
pub fn is_reserved(value: i32) -> bool {
    (SIGNAL_BUFFER_REQUEST_G1..=SIGNAL_BUFFER_REQUEST).contains(&value)
}
