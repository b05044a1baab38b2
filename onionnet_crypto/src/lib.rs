//! Functions for the core crypto.
//!
//! Two primitives are used by the onion network. Relay keys are X25519 key
//! pairs and anything addressed to a relay is sealed to its public key with a
//! fresh ephemeral key pair. Layer payloads and responses are encrypted with a
//! per-layer 256-bit session key using XSalsa20-Poly1305.

use std::fmt;

use crypto_box::SalsaBox;
use crypto_box::aead::{Aead, AeadCore, generic_array::GenericArray};
use rand::{RngCore, thread_rng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use xsalsa20poly1305::{KeyInit, XSalsa20Poly1305};
use zeroize::Zeroize;

pub use crypto_box::{PublicKey, SecretKey, KEY_SIZE};

/// Size of the session key in bytes.
pub const SESSION_KEY_SIZE: usize = xsalsa20poly1305::KEY_SIZE;
/// Size of the nonce prepended to every ciphertext.
pub const NONCE_SIZE: usize = xsalsa20poly1305::NONCE_SIZE;
/// Size of the authentication tag appended by the cipher.
pub const TAG_SIZE: usize = xsalsa20poly1305::TAG_SIZE;
/// Bytes added by `sym_encrypt` on top of the plaintext.
pub const SYM_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;
/// Bytes added by `asym_encrypt` on top of the plaintext.
pub const ASYM_OVERHEAD: usize = KEY_SIZE + NONCE_SIZE + TAG_SIZE;

/// Error that can happen during encryption or decryption.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CryptoError {
    /// Ciphertext is too short, corrupted or was encrypted for another key.
    #[error("Bad ciphertext")]
    BadCiphertext,
    /// Session key has wrong length.
    #[error("Session key should be {} bytes long: {} bytes", SESSION_KEY_SIZE, len)]
    InvalidKeyLength {
        /// Length of the received key.
        len: usize,
    },
    /// The cipher refused to encrypt the data.
    #[error("Encryption failed")]
    Encrypt,
}

/// Long-term asymmetric key pair of a relay.
#[derive(Clone)]
pub struct KeyPair {
    /// Public key. It's the only part that leaves the relay.
    pub pk: PublicKey,
    /// Secret key.
    pub sk: SecretKey,
}

impl KeyPair {
    /// Restore key pair from its secret part.
    pub fn from_secret_key(sk: SecretKey) -> KeyPair {
        let pk = sk.public_key();
        KeyPair { pk, sk }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("pk", &self.pk)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh asymmetric key pair.
pub fn generate_asymmetric_keypair() -> KeyPair {
    KeyPair::from_secret_key(SecretKey::generate(&mut thread_rng()))
}

/** Encrypt `data` so that only the owner of `pk` can read it.

Output is `ephemeral_pk ‖ nonce ‖ ciphertext`, its length is always
`data.len() + ASYM_OVERHEAD`.
*/
pub fn asym_encrypt(pk: &PublicKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut rng = thread_rng();
    let ephemeral_sk = SecretKey::generate(&mut rng);
    let ephemeral_pk = ephemeral_sk.public_key();
    let salsa_box = SalsaBox::new(pk, &ephemeral_sk);
    let nonce = SalsaBox::generate_nonce(&mut rng);
    let encrypted = salsa_box.encrypt(&nonce, data)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut result = Vec::with_capacity(ASYM_OVERHEAD + data.len());
    result.extend_from_slice(ephemeral_pk.as_bytes());
    result.extend_from_slice(nonce.as_slice());
    result.extend_from_slice(&encrypted);
    Ok(result)
}

/// Decrypt data produced by `asym_encrypt` with the matching secret key.
pub fn asym_decrypt(sk: &SecretKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < ASYM_OVERHEAD {
        return Err(CryptoError::BadCiphertext)
    }

    let (ephemeral_pk, rest) = data.split_at(KEY_SIZE);
    let (nonce, encrypted) = rest.split_at(NONCE_SIZE);
    let mut ephemeral_pk_bytes = [0; KEY_SIZE];
    ephemeral_pk_bytes.copy_from_slice(ephemeral_pk);
    let salsa_box = SalsaBox::new(&PublicKey::from(ephemeral_pk_bytes), sk);

    salsa_box.decrypt(GenericArray::from_slice(nonce), encrypted)
        .map_err(|_| CryptoError::BadCiphertext)
}

/// Symmetric key used for exactly one layer of one message.
///
/// The key material is zeroed when the key is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Create key from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<SessionKey, CryptoError> {
        if bytes.len() != SESSION_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength { len: bytes.len() })
        }
        let mut key = [0; SESSION_KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(SessionKey(key))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn cipher(&self) -> XSalsa20Poly1305 {
        XSalsa20Poly1305::new(xsalsa20poly1305::Key::from_slice(&self.0))
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Generate a fresh random session key.
pub fn generate_symmetric_key() -> SessionKey {
    let mut key = [0; SESSION_KEY_SIZE];
    thread_rng().fill_bytes(&mut key);
    SessionKey(key)
}

/// Encrypt `plaintext` with a fresh random nonce. Output is `nonce ‖ ciphertext`.
pub fn sym_encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = XSalsa20Poly1305::generate_nonce(&mut thread_rng());
    let encrypted = key.cipher().encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::Encrypt)?;

    let mut result = Vec::with_capacity(NONCE_SIZE + encrypted.len());
    result.extend_from_slice(nonce.as_slice());
    result.extend_from_slice(&encrypted);
    Ok(result)
}

/// Decrypt data produced by `sym_encrypt`.
pub fn sym_decrypt(key: &SessionKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < SYM_OVERHEAD {
        return Err(CryptoError::BadCiphertext)
    }

    let (nonce, encrypted) = blob.split_at(NONCE_SIZE);
    key.cipher().decrypt(xsalsa20poly1305::Nonce::from_slice(nonce), encrypted)
        .map_err(|_| CryptoError::BadCiphertext)
}

/// SHA-256 of the public key as lowercase hex. Used for display only.
pub fn fingerprint(pk: &PublicKey) -> String {
    hex::encode(Sha256::digest(pk.as_bytes()))
}
