//! Cryptographic primitives for pairing and collection decryption
//!
//! - Sealed boxes (X25519 + XSalsa20-Poly1305) carry the credential payload
//!   from the sender to this receiver's public key.
//! - Secretbox (XSalsa20-Poly1305) wraps each file key under the collection key.
//! - Blobs (XChaCha20-Poly1305) hold file metadata and content under the file key;
//!   the 24-byte decryption header is the nonce.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use crypto_box::aead::{Aead, AeadCore, KeyInit, OsRng};
use crypto_box::{PublicKey, SecretKey};
use crypto_secretbox::XSalsa20Poly1305;
use thiserror::Error;

/// Symmetric key length for every cipher in this module
pub const KEY_BYTES: usize = 32;

/// Nonce / decryption header length (XSalsa20 and XChaCha20)
pub const NONCE_BYTES: usize = 24;

/// Crypto error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key length: expected {KEY_BYTES} bytes, got {0}")]
    InvalidKey(usize),

    #[error("Invalid nonce length: expected {NONCE_BYTES} bytes, got {0}")]
    InvalidNonce(usize),

    #[error("Decryption failed")]
    Decrypt,

    #[error("Encryption failed")]
    Encrypt,

    #[error("Invalid base64: {0}")]
    Base64(String),
}

/// Asymmetric keypair used to receive the sealed credential payload
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Raw public key bytes
    pub fn public_key(&self) -> [u8; KEY_BYTES] {
        *self.public.as_bytes()
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn into_parts(self) -> (PublicKey, SecretKey) {
        (self.public, self.secret)
    }
}

/// Seal `plaintext` so only the holder of the matching secret key can open it
pub fn seal(plaintext: &[u8], public_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let public = public_key_from_slice(public_key)?;
    public
        .seal(&mut OsRng, plaintext)
        .map_err(|_| CryptoError::Encrypt)
}

/// Open a sealed box addressed to `secret_key`
pub fn unseal(ciphertext: &[u8], secret_key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    secret_key.unseal(ciphertext).map_err(|_| CryptoError::Decrypt)
}

/// Decrypt a secretbox (used for per-file keys)
pub fn open_secretbox(ciphertext: &[u8], nonce: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XSalsa20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKey(key.len()))?;
    check_nonce(nonce)?;
    cipher
        .decrypt(crypto_secretbox::Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Encrypt with a secretbox, returning `(ciphertext, nonce)`
pub fn seal_secretbox(plaintext: &[u8], key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let cipher = XSalsa20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKey(key.len()))?;
    let nonce = XSalsa20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;
    Ok((ciphertext, nonce.to_vec()))
}

/// Decrypt a metadata or content blob with its decryption header
pub fn decrypt_blob(ciphertext: &[u8], header: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKey(key.len()))?;
    check_nonce(header)?;
    cipher
        .decrypt(XNonce::from_slice(header), ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Encrypt a blob, returning `(ciphertext, decryption_header)`
pub fn encrypt_blob(plaintext: &[u8], key: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::InvalidKey(key.len()))?;
    let header = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&header, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;
    Ok((ciphertext, header.to_vec()))
}

/// Generate a random symmetric key
pub fn generate_key() -> [u8; KEY_BYTES] {
    let key = XChaCha20Poly1305::generate_key(&mut OsRng);
    let mut out = [0u8; KEY_BYTES];
    out.copy_from_slice(&key);
    out
}

pub fn to_b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_b64(s: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(s.trim())
        .map_err(|e| CryptoError::Base64(e.to_string()))
}

fn public_key_from_slice(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let raw: [u8; KEY_BYTES] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(bytes.len()))?;
    Ok(PublicKey::from(raw))
}

fn check_nonce(nonce: &[u8]) -> Result<(), CryptoError> {
    if nonce.len() != NONCE_BYTES {
        return Err(CryptoError::InvalidNonce(nonce.len()));
    }
    Ok(())
}
