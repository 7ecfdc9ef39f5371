//! SHA-256 helpers.
//!
//! Used for cell hashes, ADNL key ids, packet checksums and handshake
//! params digests.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `data`.
///
/// # Example
/// ```
/// use ton_crypto::sha256::sha256;
///
/// let hash = sha256(b"Hello, TON!");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Computes the SHA-256 digest of several slices as if they were concatenated.
///
/// ```
/// use ton_crypto::sha256::{sha256, sha256_multi};
///
/// assert_eq!(sha256_multi(&[b"Hello, ", b"TON!"]), sha256(b"Hello, TON!"));
/// ```
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
