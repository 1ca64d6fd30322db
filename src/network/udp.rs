//! Non-blocking UDP transport
//!
//! One socket per session. Sends and receives raw datagrams without any
//! framing knowledge; header handling lives in [`crate::protocol`].

use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

use crate::error::NetworkError;

/// Non-blocking UDP socket with enlarged kernel buffers
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    /// Default destination (client mode)
    peer: Option<SocketAddr>,
}

impl UdpTransport {
    /// Bind the relay socket on a well-known address
    pub fn bind(bind_addr: SocketAddr, buffer_bytes: usize) -> Result<Self, NetworkError> {
        Self::open(bind_addr, None, buffer_bytes)
    }

    /// Bind an ephemeral local socket that sends to `peer` by default
    pub fn connect(
        bind_addr: SocketAddr,
        peer: SocketAddr,
        buffer_bytes: usize,
    ) -> Result<Self, NetworkError> {
        Self::open(bind_addr, Some(peer), buffer_bytes)
    }

    fn open(
        bind_addr: SocketAddr,
        peer: Option<SocketAddr>,
        buffer_bytes: usize,
    ) -> Result<Self, NetworkError> {
        let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| NetworkError::BindFailed(format!("socket: {}", e)))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| NetworkError::SocketOption(format!("non-blocking: {}", e)))?;

        // Kernel may clamp these; a smaller buffer only costs burst tolerance
        if let Err(e) = socket.set_recv_buffer_size(buffer_bytes) {
            tracing::warn!(error = %e, "Could not enlarge receive buffer");
        }
        if let Err(e) = socket.set_send_buffer_size(buffer_bytes) {
            tracing::warn!(error = %e, "Could not enlarge send buffer");
        }

        socket
            .bind(&bind_addr.into())
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", bind_addr, e)))?;

        let socket: UdpSocket = socket.into();
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        tracing::info!(local = %local_addr, peer = ?peer, "UDP transport open");

        Ok(Self {
            socket,
            local_addr,
            peer,
        })
    }

    /// Best-effort send of one datagram. Returns false on any failed or
    /// partial write; callers do not retry.
    pub fn send_to(&self, data: &[u8], dest: SocketAddr) -> bool {
        match self.socket.send_to(data, dest) {
            Ok(sent) => sent == data.len(),
            Err(e) => {
                tracing::trace!(error = %e, dest = %dest, "UDP send failed");
                false
            }
        }
    }

    /// Send to the configured peer; false if there is none
    pub fn send(&self, data: &[u8]) -> bool {
        match self.peer {
            Some(peer) => self.send_to(data, peer),
            None => false,
        }
    }

    /// Poll for one pending datagram. Returns `None` when nothing is queued
    /// (or the read failed); never blocks.
    pub fn try_recv(&self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => Some((len, from)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                tracing::trace!(error = %e, "UDP receive failed");
                None
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local_addr", &self.local_addr)
            .field("peer", &self.peer)
            .finish()
    }
}
