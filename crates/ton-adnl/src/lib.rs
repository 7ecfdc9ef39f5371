//! # ton-adnl
//!
//! ADNL over TCP for talking to TON liteservers.
//!
//! - **Session**: [`AdnlClientTcp`] performs the handshake and moves
//!   encrypted packets over one TCP connection
//! - **Query wrapping**: lite-server requests travel inside
//!   `adnl.message.query(liteServer.query(...))` and are matched to their
//!   answers by a random 32-byte id
//! - **Engines**: [`LiteSingleEngine`] keeps one liteserver connected and
//!   correlates queries; [`RateLimitedEngine`], [`RoundRobinEngine`] and
//!   [`LoggingEngine`] wrap any [`LiteEngine`]
//!
//! ## Protocol Overview
//!
//! 1. Client generates 160 random bytes and derives the session ciphers
//! 2. Client computes the ECDH shared secret with the server's public key
//! 3. Client sends the handshake packet (server key ID, client pubkey,
//!    digest, encrypted params)
//! 4. Server confirms with an empty ADNL packet
//! 5. All later traffic is encrypted with AES-256-CTR, one stream per
//!    direction
//!
//! ## Example
//!
//! ```rust,no_run
//! use ton_adnl::{EngineConfig, GlobalConfig, LiteEngine, RoundRobinEngine};
//!
//! async fn query_time(config_json: &str) -> Result<(), Box<dyn std::error::Error>> {
//!     let global = GlobalConfig::from_json(config_json)?;
//!     let engine = RoundRobinEngine::from_global_config(&global, EngineConfig::default())?;
//!
//!     // Engines connect in the background; until one is ready the pool
//!     // answers with `NoEnginesAvailable`.
//!     while !engine.is_ready() {
//!         tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!     }
//!
//!     // liteServer.getTime
//!     let query = ton_adnl::schemas::LITESERVER_GET_TIME.to_le_bytes();
//!     let answer = engine.lite_query(&query).await?;
//!     println!("Response: {} bytes", answer.len());
//!
//!     engine.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Packet Format
//!
//! ```text
//! +----------+----------+----------------------+-------------+
//! |  Size    |  Nonce   |      Payload         |  Checksum   |
//! | 4 bytes  | 32 bytes |    N-64 bytes        |  32 bytes   |
//! | (LE u32) | (random) |                      |  (SHA256)   |
//! +----------+----------+----------------------+-------------+
//! ```
//!
//! The whole packet, size included, is encrypted with AES-256-CTR.

mod client;
mod config;
mod error;
mod handshake;
mod packet;
mod tl;

pub mod engine;
pub mod protocol;

pub use client::{AdnlClientTcp, ClientEvent, ClientState, PacketHandler};
pub use config::{
    EngineConfig, GlobalConfig, LiteServerConfig, LiteServerId, RateLimitConfig,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_QUERY_TIMEOUT, DEFAULT_RECONNECT_DELAY,
};
pub use engine::{
    ConnectionHandler, ConnectionManager, EngineEvent, LiteEngine, LiteSingleEngine,
    LoggingEngine, QueryEncoder, QueryManager, RateLimitedEngine, RoundRobinEngine,
};
pub use error::{AdnlError, Result};
pub use handshake::{
    build_handshake, server_accept, AdnlAesParams, AdnlKeys, SessionCiphers,
    HANDSHAKE_PACKET_SIZE, HANDSHAKE_PARAMS_SIZE,
};
pub use packet::{
    AdnlPacket, CHECKSUM_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, NONCE_SIZE, PACKET_OVERHEAD,
    SIZE_PREFIX,
};
pub use protocol::{encode_lite_query, generate_query_id, QueryId};

pub mod schemas {
    //! TL schema IDs of the messages this crate speaks.
    pub use crate::tl::{
        ADNL_MESSAGE_ANSWER, ADNL_MESSAGE_QUERY, BOOL_FALSE, BOOL_TRUE, LITESERVER_ERROR,
        LITESERVER_GET_MASTERCHAIN_INFO, LITESERVER_GET_TIME, LITESERVER_QUERY, PUB_ED25519,
        TCP_PING, TCP_PONG,
    };
}

pub use tl::{decode_bytes, encode_bytes, TlReader, TlWriter, MAX_TL_BYTES_LEN};
