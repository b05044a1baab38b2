/*! Conversion of messages to bytes and back.
*/

use std::fmt::Display;

use nom::IResult;
use nom::multi::length_data;
use nom::number::complete::be_u16;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Error that can happen when converting a message to or from bytes.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum CodecError {
    /// Received bytes are not a valid message of the expected type.
    #[error("Malformed message: {}", reason)]
    Malformed {
        /// Parser's explanation.
        reason: String,
    },
    /// Message can't be serialized.
    #[error("Serialize message error: {}", reason)]
    Serialize {
        /// Serializer's explanation.
        reason: String,
    },
}

impl CodecError {
    pub(crate) fn malformed<E: Display>(error: E) -> CodecError {
        CodecError::Malformed { reason: error.to_string() }
    }

    pub(crate) fn serialize<E: Display>(error: E) -> CodecError {
        CodecError::Serialize { reason: error.to_string() }
    }
}

/// A message that travels over the network.
pub trait Wire: Sized {
    /// Encode message.
    fn to_wire(&self) -> Result<Vec<u8>, CodecError>;

    /** Decode message.

    Truncated, non UTF-8 or otherwise invalid input results in
    `CodecError::Malformed`.
    */
    fn from_wire(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// A message encoded as a single JSON document.
pub trait JsonWire: Serialize + DeserializeOwned {}

impl<T: JsonWire> Wire for T {
    fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::serialize)
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::malformed)
    }
}

/** Encode JSON `header` followed by raw `body`.

Layout is `u16` big endian length of the header, the header, then the body
up to the end of the message. Nested messages are carried in the body as is,
so nesting doesn't inflate them.
*/
pub fn encode_with_body<H: Serialize>(header: &H, body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let header = serde_json::to_vec(header).map_err(CodecError::serialize)?;
    let header_len = u16::try_from(header.len())
        .map_err(|_| CodecError::serialize(format!("Header is too long: {} bytes", header.len())))?;

    let mut bytes = Vec::with_capacity(2 + header.len() + body.len());
    bytes.extend_from_slice(&header_len.to_be_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(body);
    Ok(bytes)
}

/// Split a message made by `encode_with_body` into its header and body.
pub fn decode_with_body<H: DeserializeOwned>(bytes: &[u8]) -> Result<(H, &[u8]), CodecError> {
    let parsed: IResult<&[u8], &[u8]> = length_data(be_u16)(bytes);
    let (body, header) = parsed
        .map_err(|_| CodecError::malformed(format!("Truncated header in {} bytes", bytes.len())))?;
    let header = serde_json::from_slice(header).map_err(CodecError::malformed)?;
    Ok((header, body))
}
