/*! Errors enum for the relay.
*/

use std::io::Error as IoError;
use std::net::SocketAddr;

use onionnet_crypto::CryptoError;
use onionnet_packet::onion::*;
use onionnet_packet::wire::CodecError;
use thiserror::Error;

use crate::directory::DirectoryClientError;
use crate::net::NetworkError;

/// Processing stage of a single relay connection. Every connection is closed
/// when its handler returns, whatever stage it reached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelayState {
    /// Waiting for the onion layer from the predecessor.
    AwaitLayer,
    /// Opening the layer with the relay's secret key.
    Decrypting,
    /// Connecting to the next hop and sending the inner payload.
    Forwarding,
    /// Waiting for the next hop to answer.
    AwaitResponse,
    /// Sending the encrypted response back to the predecessor.
    Returning,
}

/// Error that can happen when handling a relay connection.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Layer can't be read from the predecessor.
    #[error("Read onion layer error")]
    ReadLayer(NetworkError),
    /// Received bytes are not an onion layer.
    #[error("Malformed onion layer")]
    MalformedLayer(CodecError),
    /// Layer can't be opened with this relay's key.
    #[error("Open onion layer error")]
    Open(GetPayloadError),
    /// Exit layer without destination and no default destination configured.
    #[error("No destination for exit traffic")]
    NoDestination,
    /// Next hop can't be reached or did not answer.
    #[error("Forward to {} error", addr)]
    Forward {
        /// Address of the next hop.
        addr: SocketAddr,
        /// Network error.
        #[source]
        error: NetworkError,
    },
    /// Next relay reported a failure.
    #[error("Relay {} failed: {}", addr, reason)]
    Downstream {
        /// Address of the next relay.
        addr: SocketAddr,
        /// Reason reported by the next relay.
        reason: HopFailure,
    },
    /// Next relay answered with something that is not a `HopResponse`.
    #[error("Malformed response from next relay")]
    MalformedResponse(CodecError),
    /// Inner layer or response can't be serialized.
    #[error("Encode error")]
    Encode(CodecError),
    /// Response can't be encrypted with the session key.
    #[error("Encrypt response error")]
    Encrypt(CryptoError),
    /// Response can't be written to the predecessor.
    #[error("Return response error")]
    Return(NetworkError),
}

impl RelayError {
    /// Stage at which the connection failed.
    pub fn state(&self) -> RelayState {
        match self {
            RelayError::ReadLayer(_) | RelayError::MalformedLayer(_) => RelayState::AwaitLayer,
            RelayError::Open(_) => RelayState::Decrypting,
            RelayError::NoDestination | RelayError::Encode(_) => RelayState::Forwarding,
            RelayError::Forward { error: NetworkError::ConnectFailed { .. }, .. } => RelayState::Forwarding,
            RelayError::Forward { .. }
            | RelayError::Downstream { .. }
            | RelayError::MalformedResponse(_) => RelayState::AwaitResponse,
            RelayError::Encrypt(_) | RelayError::Return(_) => RelayState::Returning,
        }
    }

    /// Failure reported to the predecessor.
    pub fn failure(&self) -> HopFailure {
        match self {
            RelayError::ReadLayer(NetworkError::Timeout(_)) => HopFailure::Timeout,
            RelayError::ReadLayer(_) => HopFailure::Closed,
            RelayError::MalformedLayer(_) => HopFailure::Malformed,
            RelayError::Open(GetPayloadError::Deserialize(_)) => HopFailure::Malformed,
            RelayError::Open(_) => HopFailure::Decrypt,
            RelayError::NoDestination => HopFailure::NoDestination,
            RelayError::Forward { error, .. } => match error {
                NetworkError::Timeout(_) => HopFailure::Timeout,
                NetworkError::ConnectFailed { .. } => HopFailure::Unreachable,
                _ => HopFailure::Closed,
            },
            RelayError::Downstream { .. } | RelayError::MalformedResponse(_) => HopFailure::Downstream,
            RelayError::Encode(_) => HopFailure::Malformed,
            RelayError::Encrypt(_) | RelayError::Return(_) => HopFailure::Closed,
        }
    }
}

/// Error that can happen when running the relay.
#[derive(Debug, Error)]
pub enum RunError {
    /// Listener failed to accept a connection.
    #[error("IO error")]
    Io(IoError),
}

/// Error that can happen when registering the relay in the directory.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// Every registration attempt failed.
    #[error("Registration failed after {} attempts", attempts)]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error of the last attempt.
        #[source]
        source: DirectoryClientError,
    },
}
