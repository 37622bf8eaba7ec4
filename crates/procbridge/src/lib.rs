//! Stream record batches to an external worker process.
//!
//! The host binds a loopback UDP control port, launches the worker with that
//! port as its last argument, and then moves data through two shared buffers
//! while the worker drives the exchange with small integer signals.
//!
//! # Crate Structure
//!
//! - [`transport`]: Control socket and file-backed data buffers
//! - [`frame`]: Signals, size notifications and chunked record framing
//! - [`stream`]: Host-side [`Streamer`](stream::Streamer) and worker-side
//!   [`RemoteWorker`](stream::RemoteWorker)

/// Re-export transport types.
pub mod transport {
    pub use procbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use procbridge_frame::*;
}

/// Re-export streaming types.
pub mod stream {
    pub use procbridge_stream::*;
}

pub use procbridge_stream::{Streamer, StreamError, StreamerConfig, TaskConfig};
