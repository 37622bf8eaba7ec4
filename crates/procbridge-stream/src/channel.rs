//! The host's end of the control channel.

use std::time::Duration;

use procbridge_frame::{
    get_i32, signal_name, FrameError, Notification, Signal, INT_SIZE, SIGNAL_ERROR,
};
use procbridge_transport::{ControlSocket, TransportError};
use tracing::{trace, warn};

use crate::context::Diagnostics;
use crate::error::{Result, StreamError};
use crate::handshake::PortPair;

/// Single-byte payload of a read confirmation; the value is ignored.
const READ_CONFIRMATION: [u8; 1] = [0];

/// Bound control socket plus everything needed to turn its failures into
/// task-level errors.
#[derive(Debug)]
pub struct ControlChannel {
    socket: ControlSocket,
    task: String,
    diagnostics: Diagnostics,
    error_grace: Duration,
    ports: Option<PortPair>,
    buf: [u8; INT_SIZE],
}

impl ControlChannel {
    /// Bind a loopback socket with `timeout` as its initial read timeout.
    pub fn bind(
        task: &str,
        diagnostics: Diagnostics,
        error_grace: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let socket = ControlSocket::bind_loopback()?;
        socket.set_timeout(timeout)?;
        Ok(Self {
            socket,
            task: task.to_string(),
            diagnostics,
            error_grace,
            ports: None,
            buf: [0u8; INT_SIZE],
        })
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_port()?)
    }

    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        Ok(self.socket.set_timeout(timeout)?)
    }

    pub fn ports(&self) -> Option<PortPair> {
        self.ports
    }

    pub(crate) fn set_ports(&mut self, ports: PortPair) {
        self.ports = Some(ports);
    }

    /// Receive one raw 4-byte value.
    ///
    /// A timeout becomes [`StreamError::ProcessUnresponsive`].
    pub fn recv_raw(&mut self) -> Result<i32> {
        match self.socket.recv_exact(&mut self.buf) {
            Ok(()) => {
                let value = get_i32(&self.buf, 0);
                trace!(value, signal = signal_name(value), "received signal");
                Ok(value)
            }
            Err(TransportError::Timeout) => Err(self.unresponsive()),
            Err(err) => Err(err.into()),
        }
    }

    /// Receive and decode one signal.
    pub fn recv_signal(&mut self) -> Result<Signal> {
        let value = self.recv_raw()?;
        Signal::from_wire(value).map_err(|err| match err {
            FrameError::InvalidSignal(value) => {
                StreamError::Protocol(format!("invalid signal value {value}"))
            }
            other => other.into(),
        })
    }

    /// Receive one value and fail if it is the error code.
    pub fn recv_checked(&mut self) -> Result<i32> {
        let value = self.recv_raw()?;
        self.check_for_error(value)?;
        Ok(value)
    }

    /// Fail with [`StreamError::ProcessTerminated`] if `value` is the error code.
    pub fn check_for_error(&self, value: i32) -> Result<()> {
        if value == SIGNAL_ERROR {
            return Err(self.terminated());
        }
        Ok(())
    }

    /// Tell the worker a chunk is ready.
    pub fn notify(&self, notification: Notification) -> Result<()> {
        let ports = self.ports.ok_or(StreamError::NotOpen)?;
        let raw = notification.encode()?;
        self.socket.send_to(ports.data, &raw)?;
        trace!(
            size = notification.size,
            last = notification.last,
            "sent size notification"
        );
        Ok(())
    }

    /// Tell the worker its payload has been consumed.
    pub fn confirm_read(&self) -> Result<()> {
        let ports = self.ports.ok_or(StreamError::NotOpen)?;
        self.socket.send_to(ports.confirm, &READ_CONFIRMATION)?;
        Ok(())
    }

    pub fn unresponsive(&self) -> StreamError {
        warn!(task = %self.task, "external process stopped responding");
        StreamError::ProcessUnresponsive {
            task: self.task.clone(),
            diagnostics: self.diagnostics.snapshot(),
        }
    }

    /// Wait out the grace period, then build the termination error.
    pub fn terminated(&self) -> StreamError {
        warn!(
            task = %self.task,
            grace_ms = self.error_grace.as_millis() as u64,
            "external process reported an error"
        );
        std::thread::sleep(self.error_grace);
        StreamError::ProcessTerminated {
            task: self.task.clone(),
            diagnostics: self.diagnostics.snapshot(),
        }
    }
}
