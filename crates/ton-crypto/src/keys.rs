//! ADNL key ids.
//!
//! A key id (the ADNL "short id" of a node) is the SHA-256 of the
//! TL-serialized public key. Lite-server handshakes open with the key id of
//! the server's `pub.ed25519` key so the server can pick the right identity.

use std::fmt;

use crate::sha256::sha256_multi;

/// TL constructor of `pub.ed25519 key:int256 = PublicKey`, little-endian.
pub const TL_PREFIX_ED25519: [u8; 4] = [0xC6, 0xB4, 0x13, 0x48];

/// Calculates the key id of an Ed25519 public key:
/// `SHA256(TL_PREFIX_ED25519 ‖ public_key)`.
///
/// # Example
/// ```
/// use ton_crypto::keys::calculate_key_id;
/// use ton_crypto::ed25519::Ed25519Keypair;
///
/// let keypair = Ed25519Keypair::generate();
/// let key_id = calculate_key_id(&keypair.public_key);
/// assert_eq!(key_id.len(), 32);
/// ```
pub fn calculate_key_id(public_key: &[u8; 32]) -> [u8; 32] {
    sha256_multi(&[&TL_PREFIX_ED25519, public_key])
}

/// A 32-byte key id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; 32]);

impl KeyId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_ed25519_public_key(public_key: &[u8; 32]) -> Self {
        Self(calculate_key_id(public_key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character hex string. Returns `None` on bad input.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self.to_hex())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for KeyId {
    fn from(bytes: [u8; 32]) -> Self {
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for KeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
