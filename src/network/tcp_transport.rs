//! TCP transport implementation: our own `AsyncRead`/`AsyncWrite`
//! envelope framing rides directly on a `TcpStream`, without any extra
//! length-prefixing at this layer.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tracing::debug;

use crate::network::transport::{Transport, TransportConnection, TransportListener};

#[derive(Debug, Clone, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Listener = TcpListenerImpl;

    async fn listen(&self, addr: SocketAddr) -> Result<Self::Listener> {
        let listener = TokioTcpListener::bind(addr).await?;
        Ok(TcpListenerImpl { listener })
    }

    async fn connect(&self, addr: SocketAddr) -> Result<Self::Connection> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr()?;
        Ok(TcpConnection { stream, peer_addr })
    }
}

pub struct TcpListenerImpl {
    listener: TokioTcpListener,
}

#[async_trait::async_trait]
impl TransportListener for TcpListenerImpl {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<(Self::Connection, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        debug!(peer = %addr, "accepted tcp connection");
        let peer_addr = stream.peer_addr()?;
        Ok((TcpConnection { stream, peer_addr }, addr))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

pub struct TcpConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl TransportConnection for TcpConnection {
    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl AsyncRead for TcpConnection {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpConnection {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listen_then_connect_roundtrip() {
        let transport = TcpTransport::new();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut listener = transport.listen(addr).await.unwrap();
        let local_addr = listener.local_addr().unwrap();

        let accept_task = tokio::spawn(async move { listener.accept().await });
        let client = transport.connect(local_addr).await.unwrap();

        let (server, server_peer) = accept_task.await.unwrap().unwrap();
        assert_eq!(server_peer, client.peer_addr());
        drop(server);
    }
}
