//! Ed25519 key pairs.
//!
//! ADNL identifies both ends of a session by Ed25519 public keys. The client
//! side of a lite-server connection uses a fresh ephemeral pair per attempt;
//! the key agreement itself lives in [`crate::x25519`].

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::x25519::{ecdh_ed25519, X25519Error};

/// Errors that can occur during Ed25519 operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ed25519Error {
    /// The provided key bytes are invalid.
    #[error("invalid key bytes: {0}")]
    InvalidKey(String),
}

/// An Ed25519 key pair: 32-byte seed and 32-byte public key.
///
/// The seed is zeroized on drop.
///
/// # Example
/// ```
/// use ton_crypto::ed25519::Ed25519Keypair;
///
/// let alice = Ed25519Keypair::generate();
/// let bob = Ed25519Keypair::generate();
///
/// let a = alice.shared_secret(&bob.public_key).unwrap();
/// let b = bob.shared_secret(&alice.public_key).unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Ed25519Keypair {
    seed: [u8; 32],
    #[zeroize(skip)]
    pub public_key: [u8; 32],
}

impl Ed25519Keypair {
    /// Generates a new random key pair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            seed: signing_key.to_bytes(),
            public_key: signing_key.verifying_key().to_bytes(),
        }
    }

    /// Creates a key pair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self {
            seed,
            public_key: signing_key.verifying_key().to_bytes(),
        }
    }

    /// Creates a key pair from a seed slice.
    ///
    /// # Errors
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Ed25519Error> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Ed25519Error::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from_seed(seed))
    }

    /// Computes the X25519 shared secret with a peer's Ed25519 public key.
    pub fn shared_secret(&self, peer_public_key: &[u8; 32]) -> Result<[u8; 32], X25519Error> {
        ecdh_ed25519(&self.seed, peer_public_key)
    }

    pub fn public_key_bytes(&self) -> &[u8; 32] {
        &self.public_key
    }

    pub fn seed_bytes(&self) -> &[u8; 32] {
        &self.seed
    }
}

impl std::fmt::Debug for Ed25519Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Keypair")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}
