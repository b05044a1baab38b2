/*! Client of the onion network.

`send_message` does one full round trip: a fresh circuit is requested from
the directory, the message is wrapped into one layer per relay, sent to the
first relay and the response is unwrapped. Nothing is reused between calls.
*/

mod errors;
mod onion;

pub use self::errors::*;
pub use self::onion::*;

use std::net::SocketAddr;
use std::time::Duration;

use onionnet_packet::destination::DestinationResponse;
use onionnet_packet::directory::*;
use onionnet_packet::onion::HopResponse;
use onionnet_packet::wire::{CodecError, Wire};

use crate::directory::DirectoryClient;
use crate::net::*;
use crate::stats::Stats;

/// Result of a successful round trip.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Plaintext response of the destination.
    pub response: Vec<u8>,
    /// Relays the message went through, entry first.
    pub path: Vec<RelayInfo>,
}

impl Delivery {
    /// Parse the response as the echo of the destination server.
    pub fn destination_response(&self) -> Result<DestinationResponse, CodecError> {
        DestinationResponse::from_wire(&self.response)
    }
}

/// Client of the onion network.
#[derive(Clone)]
pub struct Client {
    directory: DirectoryClient,
    destination: Option<SocketAddr>,
    io_timeout: Duration,
    stats: Stats,
}

impl Client {
    /// Create new `Client` using the directory at `directory`.
    pub fn new(directory: DirectoryClient) -> Client {
        Client {
            directory,
            destination: None,
            io_timeout: DEFAULT_IO_TIMEOUT,
            stats: Stats::new(),
        }
    }

    /// Set destination put into exit layers. When `None` exit relays use
    /// their own default destination.
    pub fn set_destination(&mut self, destination: Option<SocketAddr>) {
        self.destination = destination;
    }

    /// Set timeout of every connect, read and write.
    pub fn set_io_timeout(&mut self, io_timeout: Duration) {
        self.io_timeout = io_timeout;
    }

    /// Set stats of connections to the first relay.
    pub fn set_stats(&mut self, stats: Stats) {
        self.stats = stats;
    }

    /// Ask the directory for `length` distinct relays.
    pub async fn acquire_circuit(&self, length: usize) -> Result<Vec<RelayRecord>, SendError> {
        self.directory.request_circuit(length).await
            .map_err(|e| SendError::new(SendPhase::Acquire, SendErrorCause::Directory(e)))
    }

    /// Wrap `plaintext` for `relays`, addressed to the client's destination.
    pub fn build_onion(&self, relays: &[RelayRecord], plaintext: &[u8]) -> Result<Onion, SendError> {
        build_onion(relays, plaintext, self.destination)
            .map_err(|e| SendError::new(SendPhase::Build, SendErrorCause::Build(e)))
    }

    /// Send `onion` to its first relay and return the still encrypted
    /// response.
    pub async fn send(&self, onion: &Onion) -> Result<Vec<u8>, SendError> {
        let send_error = |cause| SendError::new(SendPhase::Send, cause);

        let frame = onion.layer.to_wire().map_err(|e| send_error(SendErrorCause::Codec(e)))?;
        let response = exchange(onion.entry(), frame, self.io_timeout, self.stats.clone()).await
            .map_err(|e| send_error(SendErrorCause::Network(e)))?;

        match HopResponse::from_wire(&response).map_err(|e| send_error(SendErrorCause::Codec(e)))? {
            HopResponse::Data { payload } => Ok(payload),
            HopResponse::Failed { reason } => {
                Err(SendError::new(SendPhase::HopForward, SendErrorCause::Hop(reason)))
            },
        }
    }

    /// Decrypt response of `onion`.
    pub fn unwrap_response(&self, payload: &[u8], onion: &Onion) -> Result<Vec<u8>, SendError> {
        unwrap_response(payload, &onion.session_keys)
            .map_err(|e| SendError::new(SendPhase::Unwrap, SendErrorCause::Crypto(e)))
    }

    /// Send `plaintext` through a new circuit of `length` relays and return
    /// the response of the destination.
    pub async fn send_message(&self, length: usize, plaintext: &[u8]) -> Result<Delivery, SendError> {
        let relays = self.acquire_circuit(length).await?;
        let onion = self.build_onion(&relays, plaintext)?;
        debug!(
            "Sending {} bytes through {}",
            plaintext.len(),
            relays.iter().map(RelayRecord::display_id).collect::<Vec<_>>().join(" -> ")
        );

        let payload = self.send(&onion).await?;
        let response = self.unwrap_response(&payload, &onion)?;

        Ok(Delivery {
            response,
            path: relays.iter().map(RelayRecord::info).collect(),
        })
    }
}

/// Turn user input into a JSON message. Text that is not JSON is sent as
/// `{"msg": text}`.
pub fn json_message(text: &str) -> Vec<u8> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(_) => text.as_bytes().to_vec(),
        Err(_) => serde_json::json!({ "msg": text }).to_string().into_bytes(),
    }
}
