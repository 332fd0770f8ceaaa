//! Transport abstraction layer for network communications.
//!
//! A single concrete transport (TCP) backs this crate; the trait split
//! still exists so the peer loop and handshake code depend only on an
//! `AsyncRead + AsyncWrite` connection type, not on `tokio::net::TcpStream`
//! directly.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Transport connection: an abstraction for an active, full-duplex byte
/// stream to a peer.
pub trait TransportConnection: AsyncRead + AsyncWrite + Send + Unpin {
    fn peer_addr(&self) -> SocketAddr;
}

/// Transport listener: accepts incoming connections, yielding a concrete
/// connection plus the remote address.
#[async_trait::async_trait]
pub trait TransportListener: Send {
    type Connection: TransportConnection;

    async fn accept(&mut self) -> Result<(Self::Connection, SocketAddr)>;
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// Transport: connection establishment for a given protocol.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Connection: TransportConnection;
    type Listener: TransportListener<Connection = Self::Connection>;

    async fn listen(&self, addr: SocketAddr) -> Result<Self::Listener>;
    async fn connect(&self, addr: SocketAddr) -> Result<Self::Connection>;
}
