//! Peer connection lifecycle: handshake, then a dispatch loop applying the
//! ban-score policy table until cancellation, a fatal error, or a ban.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consensus::{BlockHeader, CryptoProvider, Transaction};
use crate::network::ban_score::BanScore;
use crate::network::envelope::{self, EnvelopeError};
use crate::network::handshake::{self, HandshakeError, LocalHello};
use crate::network::header_chain::HeaderChainError;
use crate::network::payload::{self, InventoryItem, VersionPayload};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("peer banned (score {score})")]
    Banned { score: u64 },
    #[error("cancelled")]
    Cancelled,
    #[error("idle timeout")]
    IdleTimeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability set the peer loop dispatches into. Decouples the loop from
/// any concrete mempool/chain-state implementation.
#[async_trait::async_trait]
pub trait PeerHandler: Send + Sync {
    async fn on_headers(&self, peer: SocketAddr, headers: Vec<BlockHeader>) -> Result<(), HeaderChainError>;
    async fn on_get_headers(&self, peer: SocketAddr, locator: Vec<[u8; 32]>, stop_hash: [u8; 32]) -> Vec<BlockHeader>;
    async fn on_inv(&self, peer: SocketAddr, items: Vec<InventoryItem>) -> anyhow::Result<()>;
    async fn on_get_data(&self, peer: SocketAddr, items: Vec<InventoryItem>) -> anyhow::Result<()>;
    async fn on_not_found(&self, peer: SocketAddr, items: Vec<InventoryItem>) -> anyhow::Result<()>;
    async fn on_block(&self, peer: SocketAddr, payload: Vec<u8>) -> anyhow::Result<()>;
    async fn on_tx(&self, peer: SocketAddr, tx: Transaction) -> anyhow::Result<()>;
}

pub struct PeerConfig {
    pub magic: u32,
    pub chain_id: [u8; 32],
    pub version: VersionPayload,
    pub idle_timeout: Option<Duration>,
}

pub struct Peer<S> {
    stream: S,
    addr: SocketAddr,
    provider: Arc<dyn CryptoProvider>,
    config: PeerConfig,
    ban_score: BanScore,
}

impl<S> Peer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, addr: SocketAddr, provider: Arc<dyn CryptoProvider>, config: PeerConfig) -> Self {
        Self { stream, addr, provider, config, ban_score: BanScore::new() }
    }

    /// Runs the handshake then the dispatch loop until cancellation, a
    /// fatal error, or the ban threshold is crossed.
    pub async fn run(
        &mut self,
        cancel: CancellationToken,
        handler: Arc<dyn PeerHandler>,
    ) -> Result<(), PeerError> {
        let hello = LocalHello { magic: self.config.magic, chain_id: self.config.chain_id, version: self.config.version.clone() };
        let peer_version = handshake::run(&mut self.stream, self.provider.as_ref(), &hello).await?;
        info!(peer = %self.addr, user_agent = %peer_version.user_agent, "peer ready");

        loop {
            if cancel.is_cancelled() {
                return Err(PeerError::Cancelled);
            }

            let idle_timeout = self.config.idle_timeout;
            let magic = self.config.magic;
            let provider = Arc::clone(&self.provider);
            let read_fut = async {
                let fut = envelope::read(&mut self.stream, provider.as_ref(), magic);
                match idle_timeout {
                    None => fut.await,
                    Some(d) => match timeout(d, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(EnvelopeError::Io(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "idle timeout",
                        ))),
                    },
                }
            };
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PeerError::Cancelled),
                result = read_fut => result,
            };

            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    let now = Instant::now();
                    if e.ban_delta() > 0 {
                        self.ban_score.add(now, e.ban_delta());
                    }
                    if self.ban_score.should_ban(now) {
                        return Err(PeerError::Banned { score: self.ban_score.score(now) });
                    }
                    if e.disconnect() {
                        return Err(PeerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)));
                    }
                    warn!(peer = %self.addr, error = %e, "dropping malformed frame");
                    continue;
                }
            };

            let now = Instant::now();
            if self.ban_score.should_throttle(now) {
                tokio::time::sleep(crate::network::ban_score::THROTTLE_DELAY).await;
            }

            self.dispatch(&msg, &handler).await?;

            if self.ban_score.should_ban(Instant::now()) {
                return Err(PeerError::Banned { score: self.ban_score.score(Instant::now()) });
            }
        }
    }

    async fn dispatch(&mut self, msg: &envelope::Message, handler: &Arc<dyn PeerHandler>) -> Result<(), PeerError> {
        let now = Instant::now();
        match msg.command.as_str() {
            "ping" => match payload::decode_ping(&msg.payload) {
                Ok(nonce) => {
                    envelope::write(&mut self.stream, self.provider.as_ref(), self.config.magic, "pong", &payload::encode_pong(nonce))
                        .await
                        .map_err(|e| PeerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
                }
                Err(_) => {
                    self.ban_score.add(now, 10);
                }
            },
            "pong" => {
                let _ = payload::decode_pong(&msg.payload);
            }
            "getheaders" => match payload::decode_get_headers(&msg.payload) {
                Ok(g) => {
                    let headers = handler.on_get_headers(self.addr, g.locator, g.stop_hash).await;
                    envelope::write(
                        &mut self.stream,
                        self.provider.as_ref(),
                        self.config.magic,
                        "headers",
                        &payload::encode_headers(&headers),
                    )
                    .await
                    .map_err(|e| PeerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
                }
                Err(_) => {
                    self.ban_score.add(now, 10);
                }
            },
            "headers" => match payload::decode_headers(&msg.payload) {
                Ok(headers) => {
                    if let Err(e) = handler.on_headers(self.addr, headers).await {
                        let delta = match e {
                            HeaderChainError::TimestampFuture => 0,
                            HeaderChainError::LinkageInvalid
                            | HeaderChainError::PowInvalid
                            | HeaderChainError::TargetInvalid
                            | HeaderChainError::TimestampOld => 100,
                            HeaderChainError::Other(_) => 10,
                        };
                        if delta > 0 {
                            self.ban_score.add(now, delta);
                        }
                    }
                }
                Err(_) => {
                    self.ban_score.add(now, 10);
                }
            },
            "inv" => match payload::decode_inventory(&msg.payload) {
                Ok(items) => {
                    if handler.on_inv(self.addr, items).await.is_err() {
                        self.ban_score.add(now, 5);
                    }
                }
                Err(_) => {
                    self.ban_score.add(now, 10);
                }
            },
            "getdata" => match payload::decode_inventory(&msg.payload) {
                Ok(items) => {
                    if handler.on_get_data(self.addr, items).await.is_err() {
                        self.ban_score.add(now, 2);
                    }
                }
                Err(_) => {
                    self.ban_score.add(now, 10);
                }
            },
            "notfound" => match payload::decode_inventory(&msg.payload) {
                Ok(items) => {
                    let _ = handler.on_not_found(self.addr, items).await;
                }
                Err(_) => {
                    self.ban_score.add(now, 10);
                }
            },
            "block" => {
                if handler.on_block(self.addr, msg.payload.clone()).await.is_err() {
                    self.ban_score.add(now, 100);
                }
            }
            "tx" => {
                if let Ok(tx) = Transaction::parse(&msg.payload) {
                    if handler.on_tx(self.addr, tx).await.is_err() {
                        self.ban_score.add(now, 5);
                    }
                }
            }
            other => {
                debug!(peer = %self.addr, command = other, "ignoring unrecognised command");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::Sha3CryptoProvider;
    use crate::network::payload::PROTOCOL_VERSION;

    struct NoopHandler;

    #[async_trait::async_trait]
    impl PeerHandler for NoopHandler {
        async fn on_headers(&self, _peer: SocketAddr, _headers: Vec<BlockHeader>) -> Result<(), HeaderChainError> {
            Ok(())
        }
        async fn on_get_headers(&self, _peer: SocketAddr, _locator: Vec<[u8; 32]>, _stop_hash: [u8; 32]) -> Vec<BlockHeader> {
            vec![]
        }
        async fn on_inv(&self, _peer: SocketAddr, _items: Vec<InventoryItem>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn on_get_data(&self, _peer: SocketAddr, _items: Vec<InventoryItem>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn on_not_found(&self, _peer: SocketAddr, _items: Vec<InventoryItem>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn on_block(&self, _peer: SocketAddr, _payload: Vec<u8>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn on_tx(&self, _peer: SocketAddr, _tx: Transaction) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn version() -> VersionPayload {
        VersionPayload {
            protocol_version: PROTOCOL_VERSION,
            chain_id: [3u8; 32],
            services: 0,
            timestamp: 0,
            nonce: 1,
            user_agent: "/rubin:test/".to_string(),
            start_height: 0,
            relay: true,
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_run_loop() {
        let (client, server) = tokio::io::duplex(4096);
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let provider: Arc<dyn CryptoProvider> = Arc::new(Sha3CryptoProvider);
        let config = PeerConfig { magic: 1, chain_id: [3u8; 32], version: version(), idle_timeout: None };
        let mut peer = Peer::new(server, addr, provider.clone(), config);
        let handler: Arc<dyn PeerHandler> = Arc::new(NoopHandler);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        let run_task = tokio::spawn(async move { peer.run(cancel_clone, handler).await });

        // Drive the other side of the handshake so `run` gets past it.
        let mut client = client;
        let client_hello = LocalHello { magic: 1, chain_id: [3u8; 32], version: version() };
        let _ = handshake::run(&mut client, provider.as_ref(), &client_hello).await;

        cancel.cancel();
        let result = run_task.await.unwrap();
        assert!(matches!(result, Err(PeerError::Cancelled)));
    }
}
