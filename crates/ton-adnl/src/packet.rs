//! ADNL packet framing.
//!
//! After the handshake, all communication uses ADNL packets, which are then
//! encrypted as a byte stream with the session cipher:
//!
//! ```text
//! +----------+----------+----------------------+-------------+
//! |  Size    |  Nonce   |      Payload         |  Checksum   |
//! | 4 bytes  | 32 bytes |    N-64 bytes        |  32 bytes   |
//! | (LE u32) | (random) |                      |  (SHA256)   |
//! +----------+----------+----------------------+-------------+
//! ```
//!
//! - Size: little-endian u32 of `nonce + payload + checksum`
//! - Checksum = SHA256(nonce || payload)

use ton_crypto::{random_bytes, sha256::sha256_multi};

use crate::error::{AdnlError, Result};

/// Size of the nonce in ADNL packets.
pub const NONCE_SIZE: usize = 32;

/// Size of the checksum in ADNL packets.
pub const CHECKSUM_SIZE: usize = 32;

/// Size of the length prefix.
pub const SIZE_PREFIX: usize = 4;

/// Overhead counted by the size field (nonce + checksum).
pub const PACKET_OVERHEAD: usize = NONCE_SIZE + CHECKSUM_SIZE;

/// Smallest complete packet on the wire: prefix, nonce and checksum.
pub const MIN_PACKET_SIZE: usize = SIZE_PREFIX + PACKET_OVERHEAD;

/// Maximum value accepted in the size field (10 MB).
pub const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

/// A decoded ADNL packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdnlPacket {
    nonce: [u8; NONCE_SIZE],
    payload: Vec<u8>,
}

impl AdnlPacket {
    /// Wraps a payload with a fresh random nonce.
    pub fn build(payload: Vec<u8>) -> Self {
        Self::build_with_nonce(payload, random_bytes())
    }

    /// Wraps a payload with a fixed nonce, for deterministic output.
    pub fn build_with_nonce(payload: Vec<u8>, nonce: [u8; NONCE_SIZE]) -> Self {
        Self { nonce, payload }
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Wire length including the size prefix.
    pub fn len(&self) -> usize {
        MIN_PACKET_SIZE + self.payload.len()
    }

    /// True for the empty packet a server sends to acknowledge a handshake.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    fn checksum(nonce: &[u8], payload: &[u8]) -> [u8; 32] {
        sha256_multi(&[nonce, payload])
    }

    /// Serializes the packet (before encryption).
    pub fn to_bytes(&self) -> Vec<u8> {
        let size = (PACKET_OVERHEAD + self.payload.len()) as u32;
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&Self::checksum(&self.nonce, &self.payload));
        out
    }

    /// Parses one packet from the front of a decrypted buffer.
    ///
    /// Returns `Ok(None)` while the buffer holds less than one whole packet.
    /// On success the packet's [`len`](Self::len) tells how many bytes to
    /// drop from the buffer.
    ///
    /// # Errors
    ///
    /// - [`AdnlError::InvalidPacket`] if the size field is below 64
    /// - [`AdnlError::PacketTooLarge`] if it exceeds [`MAX_PACKET_SIZE`]
    /// - [`AdnlError::ChecksumMismatch`] if the hash does not match
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        let Some(prefix) = data.first_chunk::<SIZE_PREFIX>() else {
            return Ok(None);
        };
        let size = u32::from_le_bytes(*prefix) as usize;

        if size < PACKET_OVERHEAD {
            return Err(AdnlError::InvalidPacket(format!(
                "packet too small: {} bytes",
                size
            )));
        }
        if size > MAX_PACKET_SIZE {
            return Err(AdnlError::PacketTooLarge {
                size,
                max: MAX_PACKET_SIZE,
            });
        }
        if data.len() - SIZE_PREFIX < size {
            return Ok(None);
        }

        let body = &data[SIZE_PREFIX..SIZE_PREFIX + size];
        let (nonce, rest) = body.split_at(NONCE_SIZE);
        let (payload, checksum) = rest.split_at(size - PACKET_OVERHEAD);

        if checksum != Self::checksum(nonce, payload) {
            return Err(AdnlError::ChecksumMismatch);
        }

        let mut fixed = [0u8; NONCE_SIZE];
        fixed.copy_from_slice(nonce);
        Ok(Some(Self::build_with_nonce(payload.to_vec(), fixed)))
    }
}
