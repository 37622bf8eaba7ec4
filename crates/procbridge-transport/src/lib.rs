//! Loopback transport for the procbridge streaming protocol.
//!
//! Two pieces live here:
//! - [`ControlSocket`], the UDP socket that carries 4-byte signals, size
//!   notifications and read confirmations between host and worker
//! - the data plane: [`ChunkSink`] / [`ChunkSource`] and the file-backed
//!   [`SharedFile`] buffer that carries the chunk bytes themselves
//!
//! This is the lowest layer of procbridge. Everything else builds on it.

pub mod error;
pub mod file;
pub mod socket;
pub mod traits;

pub use error::{Result, TransportError};
pub use file::SharedFile;
pub use socket::{ControlSocket, MAX_CONTROL_DATAGRAM};
pub use traits::{ChunkSink, ChunkSource};
