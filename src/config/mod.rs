//! Configuration for the P2P subsystem.
//!
//! Everything consensus-, storage-, or RPC-related belongs to an
//! embedding node binary, not to this crate; `P2pConfig` carries only the
//! settings the wire layer itself needs.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8333".parse().unwrap()
}

fn default_max_peers() -> usize {
    125
}

fn default_user_agent() -> String {
    "/rubin:0.1.0/".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    90
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct P2pConfig {
    /// 4-byte network magic, stored as a u32.
    pub magic: u32,

    /// 32-byte local chain identifier, hex-encoded in TOML.
    #[serde(with = "hex::serde")]
    pub chain_id: [u8; 32],

    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-message read deadline in seconds; `0` disables the idle timeout.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl P2pConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_secs))
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            magic: 0x5255_4249, // "RUBI"
            chain_id: [0u8; 32],
            listen_addr: default_listen_addr(),
            max_peers: default_max_peers(),
            user_agent: default_user_agent(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}
