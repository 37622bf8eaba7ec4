use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Result, TransportError};

/// Largest control datagram: signals, notifications and confirmations are
/// all a few bytes.
pub const MAX_CONTROL_DATAGRAM: usize = 64;

/// Loopback UDP socket used as the synchronous control channel.
///
/// Binds to an ephemeral port chosen by the operating system. Peers are
/// addressed by port only; the host is always the loopback address.
#[derive(Debug)]
pub struct ControlSocket {
    socket: UdpSocket,
    host: IpAddr,
}

impl ControlSocket {
    /// Bind a socket on the IPv4 loopback address with an ephemeral port.
    pub fn bind_loopback() -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let bound = socket.local_addr()?;
        debug!(port = bound.port(), "bound control socket");

        Ok(Self {
            socket,
            host: addr.ip(),
        })
    }

    /// The port this socket is bound to.
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Set the read timeout applied to every subsequent receive.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.socket.set_read_timeout(Some(timeout))?;
        Ok(())
    }

    /// Current read timeout, if any.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        Ok(self.socket.read_timeout()?)
    }

    /// Receive one datagram that must fill `buf` exactly (blocking).
    ///
    /// Returns [`TransportError::Timeout`] when the read timeout elapses.
    /// Datagrams shorter or longer than `buf` are rejected.
    pub fn recv_exact(&self, buf: &mut [u8]) -> Result<()> {
        // One spare byte so an oversized datagram shows up as too long
        // instead of being silently truncated.
        let mut scratch = [0u8; MAX_CONTROL_DATAGRAM + 1];
        let expected = buf.len();
        if expected > MAX_CONTROL_DATAGRAM {
            return Err(TransportError::DatagramSize {
                len: expected,
                expected: MAX_CONTROL_DATAGRAM,
            });
        }
        let scratch = &mut scratch[..=expected];

        loop {
            match self.socket.recv_from(scratch) {
                Ok((len, from)) => {
                    trace!(len, %from, "received datagram");
                    if len != expected {
                        return Err(TransportError::DatagramSize { len, expected });
                    }
                    buf.copy_from_slice(&scratch[..len]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Err(TransportError::Timeout);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Send one datagram to `port` on the loopback host.
    pub fn send_to(&self, port: u16, payload: &[u8]) -> Result<()> {
        let sent = self.socket.send_to(payload, (self.host, port))?;
        if sent != payload.len() {
            return Err(TransportError::DatagramSize {
                len: sent,
                expected: payload.len(),
            });
        }
        trace!(port, len = sent, "sent datagram");
        Ok(())
    }
}
