//! Port handshake.
//!
//! Right after launch the worker sends two 4-byte integers to the host's
//! control port: first the port it listens on for size notifications, then
//! the port it listens on for read confirmations. Either may instead carry
//! the error code.

use procbridge_frame::put_i32;
use procbridge_frame::INT_SIZE;
use procbridge_transport::ControlSocket;
use tracing::{debug, info};

use crate::channel::ControlChannel;
use crate::error::{Result, StreamError};

/// The two worker ports learned during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    /// Receives size notifications (`port1`).
    pub data: u16,
    /// Receives read confirmations (`port2`).
    pub confirm: u16,
}

/// Host side: receive both ports, failing on the error code.
pub fn receive_ports(channel: &mut ControlChannel) -> Result<PortPair> {
    let data = to_port(channel.recv_checked()?)?;
    debug!(port = data, "received data port");
    let confirm = to_port(channel.recv_checked()?)?;
    debug!(port = confirm, "received confirmation port");

    let ports = PortPair { data, confirm };
    channel.set_ports(ports);
    info!(data, confirm, "port handshake complete");
    Ok(ports)
}

/// Worker side: announce both ports to the host's control port.
pub fn announce_ports(socket: &ControlSocket, host_port: u16, ports: PortPair) -> Result<()> {
    for port in [ports.data, ports.confirm] {
        let mut raw = [0u8; INT_SIZE];
        put_i32(&mut raw, 0, i32::from(port));
        socket.send_to(host_port, &raw)?;
    }
    debug!(host_port, data = ports.data, confirm = ports.confirm, "announced ports");
    Ok(())
}

fn to_port(value: i32) -> Result<u16> {
    u16::try_from(value)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| StreamError::Protocol(format!("invalid port {value} in handshake")))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use procbridge_frame::SIGNAL_ERROR;

    use super::*;
    use crate::context::Diagnostics;

    fn channel(grace: Duration) -> ControlChannel {
        ControlChannel::bind(
            "handshake-test",
            Diagnostics::new(),
            grace,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn ports_roundtrip() {
        let mut host = channel(Duration::ZERO);
        let worker = ControlSocket::bind_loopback().unwrap();
        let ports = PortPair {
            data: 40001,
            confirm: 40002,
        };

        announce_ports(&worker, host.local_port().unwrap(), ports).unwrap();
        assert_eq!(receive_ports(&mut host).unwrap(), ports);
        assert_eq!(host.ports(), Some(ports));
    }

    #[test]
    fn error_code_instead_of_port_terminates_after_grace() {
        let mut host = channel(Duration::from_millis(50));
        let worker = ControlSocket::bind_loopback().unwrap();
        let mut raw = [0u8; INT_SIZE];
        put_i32(&mut raw, 0, SIGNAL_ERROR);
        worker.send_to(host.local_port().unwrap(), &raw).unwrap();

        let start = Instant::now();
        let err = receive_ports(&mut host).unwrap_err();
        assert!(matches!(err, StreamError::ProcessTerminated { .. }));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn silence_is_unresponsive() {
        let mut host = ControlChannel::bind(
            "silent",
            Diagnostics::new(),
            Duration::ZERO,
            Duration::from_millis(30),
        )
        .unwrap();

        let err = receive_ports(&mut host).unwrap_err();
        assert!(matches!(
            err,
            StreamError::ProcessUnresponsive { ref task, .. } if task == "silent"
        ));
    }

    #[test]
    fn out_of_range_port_rejected() {
        assert!(matches!(to_port(70000), Err(StreamError::Protocol(_))));
        assert!(matches!(to_port(0), Err(StreamError::Protocol(_))));
        assert_eq!(to_port(8080).unwrap(), 8080);
    }
}
