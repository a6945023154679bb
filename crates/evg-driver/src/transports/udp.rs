//! UDP transport to the card's network register gateway.
//!
//! One bound, connected `UdpSocket` per device. Connecting pins the peer and
//! lets the kernel filter datagrams from other sources, so a reply received
//! here is from the device this transport was built for.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use evg_card::{Message, MESSAGE_LEN};

use crate::error::{EvgError, Result};
use crate::transport::{Transport, MAX_RETRIES, REPLY_TIMEOUT};

/// Connected datagram endpoint to one card.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddrV4,
    reply_timeout: Duration,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect it to the device endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EvgError::Socket`] if the socket cannot be created or
    /// connected.
    pub fn connect(ip: Ipv4Addr, port: u16) -> Result<Self> {
        let peer = SocketAddrV4::new(ip, port);
        tracing::debug!(peer = %peer, "connecting UDP transport");

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(peer)?;

        if let Ok(local) = socket.local_addr() {
            tracing::debug!(local = %local, peer = %peer, "UDP transport connected");
        }

        Ok(Self {
            socket,
            peer,
            reply_timeout: REPLY_TIMEOUT,
        })
    }

    /// Override the per-attempt reply timeout (tests shorten it; the
    /// default of [`REPLY_TIMEOUT`] is normative for production use).
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// The device endpoint this transport is connected to.
    #[must_use]
    pub const fn peer(&self) -> SocketAddrV4 {
        self.peer
    }

    /// One send-then-receive attempt. Any failure here is retried by
    /// [`exchange`](Transport::exchange); only the final exhaustion is
    /// reported to the caller.
    fn attempt(&self, wire: &[u8; MESSAGE_LEN]) -> io::Result<Message> {
        let sent = self.socket.send(wire)?;
        if sent != MESSAGE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("partial send: {sent} of {MESSAGE_LEN} octets"),
            ));
        }

        self.socket.set_read_timeout(Some(self.reply_timeout))?;

        let mut buf = [0u8; 64];
        let received = self.socket.recv(&mut buf)?;
        if received != MESSAGE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("reply of {received} octets, expected {MESSAGE_LEN}"),
            ));
        }

        let mut reply = [0u8; MESSAGE_LEN];
        reply.copy_from_slice(&buf[..MESSAGE_LEN]);
        Ok(Message::from_bytes(&reply))
    }
}

impl Transport for UdpTransport {
    fn exchange(&mut self, request: &Message) -> Result<Message> {
        let wire = request.to_bytes();

        for attempt in 1..=MAX_RETRIES {
            match self.attempt(&wire) {
                Ok(reply) => {
                    if reply.status != 0 {
                        tracing::debug!(
                            peer = %self.peer,
                            status = reply.status,
                            "non-zero reply status on register {:#04x}",
                            reply.register()
                        );
                    }
                    return Ok(reply);
                }
                Err(e) => {
                    tracing::debug!(
                        peer = %self.peer,
                        attempt,
                        error = %e,
                        "exchange attempt failed"
                    );
                }
            }
        }

        tracing::warn!(peer = %self.peer, attempts = MAX_RETRIES, "exchange exhausted retries");
        Err(EvgError::TransportTimeout {
            attempts: MAX_RETRIES,
        })
    }
}

/// Convenience: connect to any `SocketAddr`, rejecting non-IPv4 endpoints.
impl TryFrom<SocketAddr> for UdpTransport {
    type Error = EvgError;

    fn try_from(addr: SocketAddr) -> Result<Self> {
        match addr {
            SocketAddr::V4(v4) => Self::connect(*v4.ip(), v4.port()),
            SocketAddr::V6(_) => Err(EvgError::invalid_argument(
                "device endpoints are IPv4 only",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_loopback() {
        let transport = UdpTransport::connect(Ipv4Addr::LOCALHOST, 2000).unwrap();
        assert_eq!(transport.peer().port(), 2000);
    }

    #[test]
    fn default_timing_is_normative() {
        assert_eq!(MAX_RETRIES, 3);
        assert_eq!(REPLY_TIMEOUT, Duration::from_millis(1000));
    }

    #[test]
    fn rejects_ipv6_endpoint() {
        let addr: SocketAddr = "[::1]:2000".parse().unwrap();
        assert!(matches!(
            UdpTransport::try_from(addr),
            Err(EvgError::InvalidArgument { .. })
        ));
    }
}
