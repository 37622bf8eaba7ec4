use procbridge_transport::TransportError;

/// Errors that can occur while encoding, chunking or decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying control channel or data buffer failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A single record does not fit into one chunk.
    #[error("record too large ({size} bytes, max {max})")]
    RecordTooLarge { size: usize, max: usize },

    /// A negative signal value outside the reserved range.
    #[error("invalid signal value {0}")]
    InvalidSignal(i32),

    /// A payload size that cannot be announced on the wire.
    #[error("payload size {0} collides with a reserved signal or exceeds i32 range")]
    UnannounceableSize(usize),

    /// Record bytes could not be decoded.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The sender or receiver has already been closed.
    #[error("data buffer closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
