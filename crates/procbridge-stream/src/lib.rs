//! Host-side orchestration of the procbridge streaming protocol.
//!
//! A [`Streamer`] binds the control socket, launches the external process
//! through a [`ProcessSetup`], learns its two ports, transfers broadcast
//! variables and then runs the signal-driven request/response loop until
//! the process reports completion or failure.
//!
//! [`RemoteWorker`] is the other end of the same protocol, used by the
//! reference worker binary and by tests.

pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod handshake;
pub mod process;
pub mod streamer;
pub mod worker;

pub use config::{
    StreamerConfig, TaskConfig, BROADCAST_COUNT_KEY, BROADCAST_NAME_PREFIX, DEFAULT_BUFFER_SIZE,
};
pub use context::{BroadcastVariables, Collector, Diagnostics};
pub use error::{Result, StreamError};
pub use handshake::PortPair;
pub use process::{CommandSetup, ProcessSetup};
pub use streamer::Streamer;
pub use worker::{BroadcastVariable, RemoteWorker, WorkerConfig};
