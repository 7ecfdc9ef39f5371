//! Error types for ADNL protocol operations.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use ton_cell::CellError;

/// Errors that can occur during ADNL operations.
///
/// The type is `Clone` so one failure can be delivered to every pending
/// query of a connection; I/O errors are shared through an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum AdnlError {
    /// I/O error from the underlying TCP connection.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    /// Connection was closed, locally or by the remote peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to perform the ADNL handshake.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Invalid packet format received.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Packet checksum verification failed.
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// Packet size exceeds the maximum allowed.
    #[error("Packet too large: {size} bytes (max: {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// Received an unexpected message type.
    #[error("Unexpected message type: 0x{0:08x}")]
    UnexpectedMessageType(u32),

    /// TL serialization/deserialization error.
    #[error("TL error: {0}")]
    TlError(String),

    /// Query timed out waiting for response.
    #[error("Query timeout")]
    QueryTimeout,

    /// The lite server answered with `liteServer.error`.
    #[error("Lite server error {code}: {message}")]
    LiteServer { code: i32, message: String },

    /// No engine in a pool could take the query.
    #[error("No engines available")]
    NoEnginesAvailable,

    /// The engine was closed by its owner.
    #[error("Engine closed")]
    EngineClosed,

    /// Key conversion or agreement failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid liteserver configuration.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Decoding a cell or BoC carried in an answer failed.
    #[error("Cell error: {0}")]
    Cell(#[from] CellError),
}

impl From<io::Error> for AdnlError {
    fn from(err: io::Error) -> Self {
        AdnlError::Io(Arc::new(err))
    }
}

/// Result type alias for ADNL operations.
pub type Result<T> = std::result::Result<T, AdnlError>;
