/*! Errors enum for the directory server and its client.
*/

use std::io::Error as IoError;

use onionnet_packet::directory::CdsError;
use onionnet_packet::wire::CodecError;
use thiserror::Error;

use crate::net::NetworkError;

/// Error that can happen when handling a connection to the directory.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Request can't be read or response can't be written.
    #[error("Network error")]
    Network(NetworkError),
    /// Response can't be serialized.
    #[error("Encode response error")]
    Encode(CodecError),
}

/// Error that can happen when running the directory server.
#[derive(Debug, Error)]
pub enum RunError {
    /// Listener failed to accept a connection.
    #[error("IO error")]
    Io(IoError),
}

/// Error that can happen when talking to the directory.
#[derive(Debug, Error)]
pub enum DirectoryClientError {
    /// Directory can't be reached.
    #[error("Network error")]
    Network(NetworkError),
    /// Request can't be encoded or response can't be decoded.
    #[error("Directory message error")]
    Codec(CodecError),
    /// Directory refused the request.
    #[error("Directory error: {}", _0)]
    Rejected(CdsError),
    /// Directory answered with a response of the wrong kind.
    #[error("Unexpected response from directory")]
    UnexpectedResponse,
    /// Directory returned a circuit that violates the circuit rules.
    #[error("Invalid circuit: requested {} distinct relays, got {}", requested, distinct)]
    InvalidCircuit {
        /// Requested length.
        requested: usize,
        /// Number of distinct relays received.
        distinct: usize,
    },
}

impl DirectoryClientError {
    /// Error of the directory itself if it refused the request.
    pub fn cds_error(&self) -> Option<&CdsError> {
        match self {
            DirectoryClientError::Rejected(e) => Some(e),
            _ => None,
        }
    }
}
