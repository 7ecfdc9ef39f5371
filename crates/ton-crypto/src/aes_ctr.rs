//! AES-CTR stream cipher.
//!
//! ADNL drives AES as a CTR keystream with a big-endian 128-bit counter.
//! Encryption and decryption are the same XOR, so each traffic direction of a
//! session is simply one independently seeded instance of [`AesCtrCipher`].
//! Both AES-128 and AES-256 keys are accepted; the variant is chosen by the
//! key length.

use aes::cipher::{KeyIvInit, StreamCipher};
use thiserror::Error;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Errors that can occur during AES-CTR operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AesCtrError {
    /// Key is neither 16 nor 32 bytes.
    #[error("invalid key length: expected 16 or 32 bytes, got {0}")]
    InvalidKey(usize),

    /// IV is not 16 bytes.
    #[error("invalid IV length: expected 16 bytes, got {0}")]
    InvalidIv(usize),
}

enum Keystream {
    Aes128(Aes128Ctr),
    Aes256(Aes256Ctr),
}

impl Keystream {
    fn init(key: &[u8], iv: &[u8; 16]) -> Result<Self, AesCtrError> {
        match key.len() {
            16 => Aes128Ctr::new_from_slices(key, iv)
                .map(Keystream::Aes128)
                .map_err(|_| AesCtrError::InvalidKey(key.len())),
            32 => Aes256Ctr::new_from_slices(key, iv)
                .map(Keystream::Aes256)
                .map_err(|_| AesCtrError::InvalidKey(key.len())),
            n => Err(AesCtrError::InvalidKey(n)),
        }
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Keystream::Aes128(c) => c.apply_keystream(data),
            Keystream::Aes256(c) => c.apply_keystream(data),
        }
    }
}

/// AES-CTR cipher with running counter state.
///
/// Each call continues the keystream where the previous call stopped, so
/// encrypting `a` then `b` equals encrypting `a ‖ b` in one call. The cipher
/// is `Send` but deliberately not `Sync`-shared: callers that use it from
/// several tasks wrap it in a mutex.
///
/// # Example
/// ```
/// use ton_crypto::aes_ctr::AesCtrCipher;
///
/// let key = [0u8; 32];
/// let iv = [0u8; 16];
/// let mut cipher = AesCtrCipher::new(key, iv);
///
/// let ciphertext = cipher.encrypt(b"Hello, TON!");
///
/// let mut cipher2 = AesCtrCipher::new(key, iv);
/// assert_eq!(cipher2.decrypt(&ciphertext), b"Hello, TON!");
/// ```
pub struct AesCtrCipher {
    key: Zeroizing<Vec<u8>>,
    iv: [u8; 16],
    stream: Keystream,
}

impl AesCtrCipher {
    /// Creates an AES-256-CTR cipher.
    pub fn new(key: [u8; 32], iv: [u8; 16]) -> Self {
        Self {
            key: Zeroizing::new(key.to_vec()),
            iv,
            stream: Keystream::Aes256(Aes256Ctr::new(&key.into(), &iv.into())),
        }
    }

    /// Creates an AES-128-CTR cipher.
    pub fn new_128(key: [u8; 16], iv: [u8; 16]) -> Self {
        Self {
            key: Zeroizing::new(key.to_vec()),
            iv,
            stream: Keystream::Aes128(Aes128Ctr::new(&key.into(), &iv.into())),
        }
    }

    /// Creates a cipher from byte slices. A 16-byte key selects AES-128, a
    /// 32-byte key selects AES-256.
    ///
    /// # Errors
    /// Returns an error if the key is not 16 or 32 bytes or the IV is not 16 bytes.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Result<Self, AesCtrError> {
        let iv: [u8; 16] = iv
            .try_into()
            .map_err(|_| AesCtrError::InvalidIv(iv.len()))?;
        let stream = Keystream::init(key, &iv)?;
        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
            iv,
            stream,
        })
    }

    /// XORs the keystream into `data`, advancing the counter.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.stream.apply(data);
    }

    /// Encrypts data in place.
    pub fn encrypt_in_place(&mut self, data: &mut [u8]) {
        self.apply(data);
    }

    /// Encrypts data and returns the ciphertext.
    pub fn encrypt(&mut self, data: &[u8]) -> Vec<u8> {
        let mut output = data.to_vec();
        self.apply(&mut output);
        output
    }

    /// Decrypts data in place. Identical to [`encrypt_in_place`](Self::encrypt_in_place).
    pub fn decrypt_in_place(&mut self, data: &mut [u8]) {
        self.apply(data);
    }

    /// Decrypts data and returns the plaintext.
    pub fn decrypt(&mut self, data: &[u8]) -> Vec<u8> {
        self.encrypt(data)
    }

    /// Rewinds the keystream to the initial counter.
    pub fn reset(&mut self) {
        // Key and IV lengths were validated on construction.
        if let Ok(stream) = Keystream::init(&self.key, &self.iv) {
            self.stream = stream;
        }
    }

    /// Key length in bytes (16 or 32).
    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// The initial IV.
    pub fn iv(&self) -> &[u8; 16] {
        &self.iv
    }
}

impl std::fmt::Debug for AesCtrCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCtrCipher")
            .field("key_len", &self.key.len())
            .field("iv", &hex::encode(self.iv))
            .finish()
    }
}

/// One-shot AES-256-CTR encryption.
pub fn aes_ctr_encrypt(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    AesCtrCipher::new(*key, *iv).encrypt(data)
}

/// One-shot AES-256-CTR decryption.
pub fn aes_ctr_decrypt(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    AesCtrCipher::new(*key, *iv).decrypt(data)
}

/// Derives the AES key and IV that protect an ADNL handshake.
///
/// - key = secret[0..16] ‖ digest[16..32]
/// - iv  = digest[0..4] ‖ secret[20..32]
///
/// `digest` is the SHA-256 of the data being encrypted (the handshake params).
///
/// # Example
/// ```
/// use ton_crypto::aes_ctr::derive_handshake_params;
///
/// let (key, iv) = derive_handshake_params(&[0x42u8; 32], &[0x24u8; 32]);
/// assert_eq!(&key[..16], &[0x42u8; 16]);
/// assert_eq!(&iv[..4], &[0x24u8; 4]);
/// ```
pub fn derive_handshake_params(secret: &[u8; 32], digest: &[u8; 32]) -> ([u8; 32], [u8; 16]) {
    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];

    key[0..16].copy_from_slice(&secret[0..16]);
    key[16..32].copy_from_slice(&digest[16..32]);

    iv[0..4].copy_from_slice(&digest[0..4]);
    iv[4..16].copy_from_slice(&secret[20..32]);

    (key, iv)
}

/// Creates the handshake cipher from a shared secret and the params digest.
pub fn handshake_cipher(secret: &[u8; 32], digest: &[u8; 32]) -> AesCtrCipher {
    let (key, iv) = derive_handshake_params(secret, digest);
    AesCtrCipher::new(key, iv)
}
