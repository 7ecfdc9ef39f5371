//! Engine settings and the liteserver list of a TON global config.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{AdnlError, Result};

/// Default delay before a dropped connection is re-established.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Default bound on TCP connect plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-query timeout.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Timing of a single-connection engine.
///
/// Serialized with millisecond fields:
///
/// ```
/// use std::time::Duration;
/// use ton_adnl::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{"query_timeout_ms": 5000}"#).unwrap();
/// assert_eq!(config.query_timeout, Duration::from_secs(5));
/// assert_eq!(config.reconnect_delay, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(rename = "reconnect_delay_ms", with = "duration_ms")]
    pub reconnect_delay: Duration,
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    #[serde(rename = "query_timeout_ms", with = "duration_ms")]
    pub query_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}

/// Query rate allowed through a [`RateLimitedEngine`](crate::RateLimitedEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
}

impl RateLimitConfig {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            requests_per_second,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteServerId {
    /// Base64 Ed25519 public key.
    pub key: String,
}

/// One `liteservers` entry of `global.config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteServerConfig {
    /// IPv4 address as a signed 32-bit integer.
    pub ip: i64,
    pub port: u16,
    pub id: LiteServerId,
}

impl LiteServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = Ipv4Addr::from((self.ip as u32).to_be_bytes());
        SocketAddr::new(IpAddr::V4(ip), self.port)
    }

    pub fn public_key(&self) -> Result<[u8; 32]> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.id.key)
            .map_err(|e| AdnlError::InvalidConfig(format!("liteserver key: {}", e)))?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            AdnlError::InvalidConfig(format!("liteserver key is {} bytes, expected 32", b.len()))
        })
    }
}

/// The parts of a TON global config the client reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub liteservers: Vec<LiteServerConfig>,
}

impl GlobalConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AdnlError::InvalidConfig(e.to_string()))
    }

    /// Address and public key of every liteserver.
    pub fn liteservers(&self) -> Result<Vec<(SocketAddr, [u8; 32])>> {
        self.liteservers
            .iter()
            .map(|ls| Ok((ls.socket_addr(), ls.public_key()?)))
            .collect()
    }
}
