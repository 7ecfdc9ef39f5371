//! X25519 key agreement over Ed25519 identities.
//!
//! ADNL peers are identified by Ed25519 keys, so the ECDH step first maps
//! both keys onto the Montgomery curve: the private seed through SHA-512 and
//! clamping, the public point through the birational map `u = (1+y)/(1-y)`.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha512};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Errors that can occur during X25519 operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum X25519Error {
    /// The provided key bytes are invalid.
    #[error("invalid key bytes: {0}")]
    InvalidKey(String),

    /// The computed shared secret is all zeros (low-order peer point).
    #[error("computed shared secret is all zeros")]
    WeakKey,
}

/// Raw X25519 Diffie-Hellman on Montgomery keys.
pub fn ecdh(private_key: &[u8; 32], their_public_key: &[u8; 32]) -> [u8; 32] {
    let secret = StaticSecret::from(*private_key);
    let public = PublicKey::from(*their_public_key);
    secret.diffie_hellman(&public).to_bytes()
}

/// Converts an Ed25519 seed to an X25519 private scalar.
///
/// `sha512(seed)[0..32]` clamped per RFC 7748.
pub fn ed25519_to_x25519_private(seed: &[u8; 32]) -> [u8; 32] {
    let hash = Sha512::digest(seed);

    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&hash[..32]);

    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;

    scalar
}

/// Converts an Ed25519 public key to its X25519 (Montgomery u) form.
///
/// # Errors
/// Returns [`X25519Error::InvalidKey`] if the bytes do not decompress to a
/// curve point.
pub fn ed25519_to_x25519_public(public_key: &[u8; 32]) -> Result<[u8; 32], X25519Error> {
    let edwards = CompressedEdwardsY(*public_key)
        .decompress()
        .ok_or_else(|| X25519Error::InvalidKey("not a valid Ed25519 point".into()))?;
    Ok(edwards.to_montgomery().to_bytes())
}

/// Computes the ADNL shared secret from a local Ed25519 seed and a peer's
/// Ed25519 public key.
///
/// # Example
/// ```
/// use ton_crypto::x25519::ecdh_ed25519;
/// use ton_crypto::ed25519::Ed25519Keypair;
///
/// let alice = Ed25519Keypair::generate();
/// let bob = Ed25519Keypair::generate();
///
/// let a = ecdh_ed25519(alice.seed_bytes(), &bob.public_key).unwrap();
/// let b = ecdh_ed25519(bob.seed_bytes(), &alice.public_key).unwrap();
/// assert_eq!(a, b);
/// ```
pub fn ecdh_ed25519(seed: &[u8; 32], their_public_key: &[u8; 32]) -> Result<[u8; 32], X25519Error> {
    let private = Zeroizing::new(ed25519_to_x25519_private(seed));
    let public = ed25519_to_x25519_public(their_public_key)?;

    let shared = ecdh(&private, &public);
    if shared.iter().all(|&b| b == 0) {
        return Err(X25519Error::WeakKey);
    }
    Ok(shared)
}
