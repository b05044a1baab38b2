/*! Destination server.

The destination reads one raw frame delivered by an exit relay and answers it
with a `DestinationResponse` echoing the payload. The payload is interpreted
as the first of these that fits:

1. JSON, echoed as is
2. base64 encoded JSON, echoed decoded
3. UTF-8 text, echoed as a string
4. anything else, echoed as base64
*/

use std::net::SocketAddr;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use onionnet_packet::destination::*;
use onionnet_packet::wire::{CodecError, Wire};
use serde_json::value::{to_raw_value, RawValue};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::codec::DecodeError;
use crate::net::*;
use crate::stats::Stats;

/// Error that can happen when handling a connection to the destination.
#[derive(Debug, Error)]
pub enum DestinationError {
    /// Payload can't be read.
    #[error("Read payload error")]
    Read(NetworkError),
    /// Response can't be serialized.
    #[error("Encode response error")]
    Encode(CodecError),
    /// Response can't be written.
    #[error("Write response error")]
    Write(NetworkError),
}

/// Error that can happen when running the destination server.
#[derive(Debug, Error)]
pub enum RunError {
    /// Listener failed to accept a connection.
    #[error("IO error")]
    Io(std::io::Error),
}

/// Answer to `payload`.
pub fn respond(payload: &[u8]) -> DestinationResponse {
    let length = payload.len();

    if let Ok(echo) = serde_json::from_slice::<Box<RawValue>>(payload) {
        return DestinationResponse::echo(echo, None, length)
    }

    let decoded = std::str::from_utf8(payload).ok()
        .and_then(|text| STANDARD.decode(text.trim()).ok())
        .and_then(|bytes| serde_json::from_slice::<Box<RawValue>>(&bytes).ok());
    if let Some(echo) = decoded {
        return DestinationResponse::echo(echo, Some(EchoEncoding::Base64Json), length)
    }

    let (text, encoding) = match std::str::from_utf8(payload) {
        Ok(text) => (text.to_owned(), EchoEncoding::Text),
        Err(_) => (STANDARD.encode(payload), EchoEncoding::Base64),
    };
    match to_raw_value(&text) {
        Ok(echo) => DestinationResponse::echo(echo, Some(encoding), length),
        Err(e) => {
            debug!("Can't echo payload of {} bytes: {}", length, e);
            DestinationResponse::error("Payload can't be echoed")
        },
    }
}

/// Error response for a payload that can't be read.
fn read_failure(error: &NetworkError) -> DestinationResponse {
    match error {
        NetworkError::Read(DecodeError::TooBigFrame { .. }) => DestinationResponse::error("Payload is too big"),
        NetworkError::Closed => DestinationResponse::error("Payload is truncated"),
        NetworkError::Timeout(_) => DestinationResponse::error("Timed out waiting for payload"),
        _ => DestinationResponse::error("Payload can't be read"),
    }
}

/// Destination server.
#[derive(Clone)]
pub struct Destination {
    io_timeout: Duration,
    stats: Stats,
}

impl Default for Destination {
    fn default() -> Self {
        Destination::new()
    }
}

impl Destination {
    /// Create new `Destination`.
    pub fn new() -> Destination {
        Destination {
            io_timeout: DEFAULT_IO_TIMEOUT,
            stats: Stats::new(),
        }
    }

    /// Set timeout for reading the payload and writing the response.
    pub fn set_io_timeout(&mut self, io_timeout: Duration) {
        self.io_timeout = io_timeout;
    }

    /// Set stats shared by all connections.
    pub fn set_stats(&mut self, stats: Stats) {
        self.stats = stats;
    }

    /// Read one payload from `stream` and answer it. If the payload can't be
    /// read an error response is still attempted.
    pub async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), DestinationError> {
        let mut framed = framed(stream, self.stats.clone());

        let (response, read_error) = match recv_frame(&mut framed, self.io_timeout).await {
            Ok(payload) => {
                trace!("Payload from {}: {} bytes", addr, payload.len());
                (respond(&payload), None)
            },
            Err(e) => (read_failure(&e), Some(e)),
        };

        let bytes = response.to_wire().map_err(DestinationError::Encode)?;
        let written = send_frame(&mut framed, bytes, self.io_timeout).await;

        match (read_error, written) {
            (Some(e), _) => Err(DestinationError::Read(e)),
            (None, Err(e)) => Err(DestinationError::Write(e)),
            (None, Ok(())) => Ok(()),
        }
    }
}

/// Run destination server on `listener`.
pub async fn destination_run(destination: &Destination, listener: TcpListener, connections_limit: usize) -> Result<(), RunError> {
    let destination = destination.clone();
    serve(listener, connections_limit, move |stream, addr| {
        let destination = destination.clone();
        async move {
            if let Err(e) = destination.handle_connection(stream, addr).await {
                debug!("Destination connection from {} failed: {}", addr, e);
            }
        }
    }).await.map_err(RunError::Io)
}
