use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors that can occur in control channel and data buffer operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the control socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to open or create a shared data buffer.
    #[error("failed to open data buffer {path}: {source}")]
    Buffer {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No datagram arrived within the active read timeout.
    #[error("timed out waiting for a datagram")]
    Timeout,

    /// A datagram arrived with the wrong length.
    #[error("unexpected datagram size ({len} bytes, expected {expected})")]
    DatagramSize { len: usize, expected: usize },

    /// A data buffer held fewer bytes than the announced chunk size.
    #[error("short chunk ({len} bytes available, expected {expected})")]
    ShortChunk { len: usize, expected: usize },

    /// An I/O error occurred on the socket or a data buffer.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns true when the error is a receive timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
