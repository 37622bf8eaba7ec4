//! Wire codec and chunking for the procbridge streaming protocol.
//!
//! Every control value on the wire is a 4-byte big-endian signed integer.
//! Size notifications append a 1-byte "last chunk" marker. Record bytes
//! travel separately through the data plane, in chunks assembled by
//! [`Sender`] and consumed by [`Receiver`].

pub mod codec;
pub mod error;
pub mod receiver;
pub mod record;
pub mod sender;
pub mod signal;

pub use codec::{
    get_i32, put_i32, Notification, INT_SIZE, LAST_MARKER, MORE_MARKER, NOTIFICATION_SIZE,
};
pub use error::{FrameError, Result};
pub use receiver::Receiver;
pub use record::{record_as_i32, RawRecordCodec, RecordDecoder, RecordEncoder, DEFAULT_MAX_RECORD};
pub use sender::Sender;
pub use signal::{
    is_reserved, signal_name, ControlCode, Group, Signal, SIGNAL_BUFFER_REQUEST, SIGNAL_BUFFER_REQUEST_G0,
    SIGNAL_BUFFER_REQUEST_G1, SIGNAL_ERROR, SIGNAL_FINISHED,
};
