//! ADNL TCP handshake.
//!
//! The client opens every connection with a 256-byte packet:
//!
//! ```text
//! +----------------+------------------+------------------+------------------+
//! | Server key id  | Client pubkey    | SHA256(params)   | enc(params)      |
//! | 32 bytes       | 32 bytes         | 32 bytes         | 160 bytes        |
//! +----------------+------------------+------------------+------------------+
//! ```
//!
//! `params` are 160 random bytes holding the AES-CTR keys and IVs of both
//! session directions. They are encrypted with a cipher derived from the
//! ECDH secret and the params digest. The server confirms with an empty
//! ADNL packet, already encrypted with the session cipher.

use ton_crypto::{
    aes_ctr::{handshake_cipher, AesCtrCipher},
    ed25519::Ed25519Keypair,
    keys::calculate_key_id,
    random_bytes,
    sha256::sha256,
};

use crate::error::{AdnlError, Result};

/// Size of the handshake packet.
pub const HANDSHAKE_PACKET_SIZE: usize = 256;

/// Size of the random session params block.
pub const HANDSHAKE_PARAMS_SIZE: usize = 160;

/// Ephemeral keys for one connection attempt.
pub struct AdnlKeys {
    keypair: Ed25519Keypair,
    peer: [u8; 32],
    shared: [u8; 32],
}

impl AdnlKeys {
    /// Generates a fresh ephemeral key pair and agrees on a secret with
    /// the peer's Ed25519 public key.
    pub fn new(peer_public_key: [u8; 32]) -> Result<Self> {
        Self::with_keypair(Ed25519Keypair::generate(), peer_public_key)
    }

    pub fn with_keypair(keypair: Ed25519Keypair, peer_public_key: [u8; 32]) -> Result<Self> {
        let shared = keypair
            .shared_secret(&peer_public_key)
            .map_err(|e| AdnlError::Crypto(e.to_string()))?;
        Ok(Self {
            keypair,
            peer: peer_public_key,
            shared,
        })
    }

    pub fn public_key(&self) -> &[u8; 32] {
        self.keypair.public_key_bytes()
    }

    pub fn peer_public_key(&self) -> &[u8; 32] {
        &self.peer
    }

    pub fn shared_secret(&self) -> &[u8; 32] {
        &self.shared
    }
}

impl std::fmt::Debug for AdnlKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdnlKeys")
            .field("public", &hex::encode(self.public_key()))
            .field("peer", &hex::encode(self.peer))
            .finish_non_exhaustive()
    }
}

/// The 160-byte params block and its digest.
///
/// Layout, from the client's point of view:
/// - `[0..32]` send key, `[64..80]` send IV
/// - `[32..64]` receive key, `[80..96]` receive IV
/// - `[96..160]` padding
#[derive(Clone)]
pub struct AdnlAesParams {
    bytes: [u8; HANDSHAKE_PARAMS_SIZE],
    hash: [u8; 32],
}

impl AdnlAesParams {
    pub fn random() -> Self {
        Self::from_bytes(random_bytes())
    }

    pub fn from_bytes(bytes: [u8; HANDSHAKE_PARAMS_SIZE]) -> Self {
        let hash = sha256(&bytes);
        Self { bytes, hash }
    }

    pub fn bytes(&self) -> &[u8; HANDSHAKE_PARAMS_SIZE] {
        &self.bytes
    }

    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    fn key(&self, offset: usize) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.bytes[offset..offset + 32]);
        key
    }

    fn iv(&self, offset: usize) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&self.bytes[offset..offset + 16]);
        iv
    }

    pub fn tx_key(&self) -> [u8; 32] {
        self.key(0)
    }

    pub fn rx_key(&self) -> [u8; 32] {
        self.key(32)
    }

    pub fn tx_iv(&self) -> [u8; 16] {
        self.iv(64)
    }

    pub fn rx_iv(&self) -> [u8; 16] {
        self.iv(80)
    }
}

impl std::fmt::Debug for AdnlAesParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdnlAesParams")
            .field("hash", &hex::encode(self.hash))
            .finish_non_exhaustive()
    }
}

/// One cipher per traffic direction.
#[derive(Debug)]
pub struct SessionCiphers {
    pub send: AesCtrCipher,
    pub recv: AesCtrCipher,
}

impl SessionCiphers {
    /// Ciphers for the side that generated the params.
    pub fn client(params: &AdnlAesParams) -> Self {
        Self {
            send: AesCtrCipher::new(params.tx_key(), params.tx_iv()),
            recv: AesCtrCipher::new(params.rx_key(), params.rx_iv()),
        }
    }

    /// Ciphers for the accepting side: the client's directions swapped.
    pub fn server(params: &AdnlAesParams) -> Self {
        Self {
            send: AesCtrCipher::new(params.rx_key(), params.rx_iv()),
            recv: AesCtrCipher::new(params.tx_key(), params.tx_iv()),
        }
    }
}

/// Builds the handshake packet for `keys` and `params`.
pub fn build_handshake(keys: &AdnlKeys, params: &AdnlAesParams) -> [u8; HANDSHAKE_PACKET_SIZE] {
    let encrypted = handshake_cipher(keys.shared_secret(), params.hash()).encrypt(params.bytes());

    let mut packet = [0u8; HANDSHAKE_PACKET_SIZE];
    packet[0..32].copy_from_slice(&calculate_key_id(keys.peer_public_key()));
    packet[32..64].copy_from_slice(keys.public_key());
    packet[64..96].copy_from_slice(params.hash());
    packet[96..].copy_from_slice(&encrypted);
    packet
}

/// Server half of the handshake: checks the addressed key id, decrypts the
/// params and verifies their digest.
///
/// The caller answers with an empty packet encrypted by
/// [`SessionCiphers::server`].
pub fn server_accept(
    server: &Ed25519Keypair,
    packet: &[u8; HANDSHAKE_PACKET_SIZE],
) -> Result<AdnlAesParams> {
    if packet[0..32] != calculate_key_id(&server.public_key) {
        return Err(AdnlError::HandshakeFailed("unknown server key id".into()));
    }

    let mut client_public = [0u8; 32];
    client_public.copy_from_slice(&packet[32..64]);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&packet[64..96]);

    let shared = server
        .shared_secret(&client_public)
        .map_err(|e| AdnlError::Crypto(e.to_string()))?;
    let decrypted = handshake_cipher(&shared, &digest).decrypt(&packet[96..]);

    let mut bytes = [0u8; HANDSHAKE_PARAMS_SIZE];
    bytes.copy_from_slice(&decrypted);
    let params = AdnlAesParams::from_bytes(bytes);
    if params.hash() != &digest {
        return Err(AdnlError::HandshakeFailed("params digest mismatch".into()));
    }
    Ok(params)
}
