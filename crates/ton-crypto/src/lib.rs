//! TON Cryptography Library
//!
//! Primitives used by the ADNL transport:
//!
//! - **Ed25519**: ephemeral and server identity key pairs
//! - **X25519**: ECDH over Ed25519 identities (Edwards to Montgomery)
//! - **AES-CTR**: per-direction stream ciphers for handshake and session traffic
//! - **SHA256**: packet checksums, params digests and key ids
//! - **Key IDs**: ADNL short ids of `pub.ed25519` keys
//!
//! # Example: deriving a session cipher
//!
//! ```
//! use ton_crypto::{ed25519::Ed25519Keypair, aes_ctr::handshake_cipher, sha256::sha256};
//!
//! let client = Ed25519Keypair::generate();
//! let server = Ed25519Keypair::generate();
//!
//! let secret = client.shared_secret(&server.public_key).unwrap();
//! let params = [7u8; 160];
//! let digest = sha256(&params);
//!
//! let encrypted = handshake_cipher(&secret, &digest).encrypt(&params);
//!
//! // The server reconstructs the same cipher from its side of the ECDH.
//! let server_secret = server.shared_secret(&client.public_key).unwrap();
//! let decrypted = handshake_cipher(&server_secret, &digest).decrypt(&encrypted);
//! assert_eq!(decrypted, params);
//! ```

pub mod aes_ctr;
pub mod ed25519;
pub mod keys;
pub mod sha256;
pub mod x25519;

pub use aes_ctr::{
    aes_ctr_decrypt, aes_ctr_encrypt, derive_handshake_params, handshake_cipher, AesCtrCipher,
    AesCtrError,
};
pub use ed25519::{Ed25519Error, Ed25519Keypair};
pub use keys::{calculate_key_id, KeyId};
pub use sha256::{sha256, sha256_multi};
pub use x25519::{ecdh, ecdh_ed25519, ed25519_to_x25519_private, ed25519_to_x25519_public, X25519Error};

/// Generates `N` cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    fill_random(&mut bytes);
    bytes
}

/// Fills a slice with cryptographically secure random bytes.
pub fn fill_random(dest: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(dest);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_crypto_flow() {
        let alice = Ed25519Keypair::generate();
        let bob = Ed25519Keypair::generate();

        assert_ne!(
            calculate_key_id(&alice.public_key),
            calculate_key_id(&bob.public_key)
        );

        let alice_shared = alice.shared_secret(&bob.public_key).unwrap();
        let bob_shared = bob.shared_secret(&alice.public_key).unwrap();
        assert_eq!(alice_shared, bob_shared);

        let iv = random_bytes::<16>();
        let message = b"Hello, TON!";
        let ciphertext = AesCtrCipher::new(alice_shared, iv).encrypt(message);
        let decrypted = AesCtrCipher::new(bob_shared, iv).decrypt(&ciphertext);
        assert_eq!(message.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_random_bytes() {
        let a = random_bytes::<32>();
        let b = random_bytes::<32>();
        assert_ne!(a, b);

        let mut buf = [0u8; 160];
        fill_random(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
