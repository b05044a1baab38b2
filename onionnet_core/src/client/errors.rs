/*! Errors enum for the client.
*/

use std::fmt;

use onionnet_crypto::CryptoError;
use onionnet_packet::directory::CdsError;
use onionnet_packet::onion::{HopFailure, SealError};
use onionnet_packet::wire::CodecError;
use thiserror::Error;

use crate::directory::DirectoryClientError;
use crate::net::NetworkError;

/// Step of `send_message` at which an error happened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendPhase {
    /// Requesting a circuit from the directory.
    Acquire,
    /// Building the onion.
    Build,
    /// Talking to the first relay.
    Send,
    /// A relay of the circuit failed to forward the onion.
    HopForward,
    /// Decrypting the response.
    Unwrap,
}

impl fmt::Display for SendPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let phase = match self {
            SendPhase::Acquire => "acquire circuit",
            SendPhase::Build => "build onion",
            SendPhase::Send => "send onion",
            SendPhase::HopForward => "forward onion",
            SendPhase::Unwrap => "unwrap response",
        };
        f.write_str(phase)
    }
}

/// Error that can happen when building an onion.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BuildError {
    /// Circuit has no relays.
    #[error("Circuit is empty")]
    EmptyCircuit,
    /// Layer can't be sealed.
    #[error("Seal layer error")]
    Seal(SealError),
}

/// The cause of a `SendError`.
#[derive(Debug, Error)]
pub enum SendErrorCause {
    /// Directory refused or failed the request.
    #[error("Directory error")]
    Directory(DirectoryClientError),
    /// Onion can't be built.
    #[error("Build error")]
    Build(BuildError),
    /// First relay can't be reached or did not answer.
    #[error("Network error")]
    Network(NetworkError),
    /// Message can't be encoded or decoded.
    #[error("Codec error")]
    Codec(CodecError),
    /// A relay reported a failure.
    #[error("Relay failure: {}", _0)]
    Hop(HopFailure),
    /// Response can't be decrypted.
    #[error("Decrypt response error")]
    Crypto(CryptoError),
}

/// Error that can happen when sending a message through a circuit.
#[derive(Debug, Error)]
#[error("Failed to {}", phase)]
pub struct SendError {
    phase: SendPhase,
    #[source]
    cause: SendErrorCause,
}

impl SendError {
    /// Create new `SendError`.
    pub fn new(phase: SendPhase, cause: SendErrorCause) -> SendError {
        SendError { phase, cause }
    }

    /// Step at which the error happened.
    pub fn phase(&self) -> SendPhase {
        self.phase
    }

    /// The cause of the error.
    pub fn cause(&self) -> &SendErrorCause {
        &self.cause
    }

    /// Error of the directory if it refused to give a circuit.
    pub fn cds_error(&self) -> Option<&CdsError> {
        match &self.cause {
            SendErrorCause::Directory(e) => e.cds_error(),
            _ => None,
        }
    }

    /// Failure reported by the circuit.
    pub fn hop_failure(&self) -> Option<HopFailure> {
        match self.cause {
            SendErrorCause::Hop(reason) => Some(reason),
            _ => None,
        }
    }
}
