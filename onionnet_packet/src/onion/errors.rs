/*! Errors enum for onion layers.
*/

use onionnet_crypto::CryptoError;
use thiserror::Error;

use crate::wire::CodecError;

/// Error that can happen when calling `get_payload` of `OnionLayer`.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum GetPayloadError {
    /// Session key is not encrypted for this relay.
    #[error("Decrypt session key error")]
    SessionKey(CryptoError),
    /// Payload can't be decrypted with the recovered session key.
    #[error("Decrypt payload error")]
    Decrypt(CryptoError),
    /// Decrypted payload is not a `NextHop`.
    #[error("Deserialize payload error")]
    Deserialize(CodecError),
}

/// Error that can happen when sealing a new `OnionLayer`.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SealError {
    /// Inner hop can't be serialized.
    #[error("Serialize next hop error")]
    Serialize(CodecError),
    /// Encryption failed.
    #[error("Encrypt layer error")]
    Encrypt(CryptoError),
}
