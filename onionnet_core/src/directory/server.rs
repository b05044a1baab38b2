/*! The implementation of the directory server
*/

use std::net::SocketAddr;
use std::time::Duration;

use futures::FutureExt;
use onionnet_packet::directory::*;
use onionnet_packet::wire::Wire;
use tokio::net::{TcpListener, TcpStream};

use super::errors::*;
use super::registry::Registry;
use crate::net::*;
use crate::stats::Stats;

/// Directory server. Clones share the registry.
#[derive(Clone)]
pub struct Server {
    registry: Registry,
    io_timeout: Duration,
    stats: Stats,
}

impl Server {
    /// Create new `Server` backed by `registry`.
    pub fn new(registry: Registry) -> Server {
        Server {
            registry,
            io_timeout: DEFAULT_IO_TIMEOUT,
            stats: Stats::new(),
        }
    }

    /// Set timeout for reading a request and writing a response.
    pub fn set_io_timeout(&mut self, io_timeout: Duration) {
        self.io_timeout = io_timeout;
    }

    /// Set stats shared by all connections.
    pub fn set_stats(&mut self, stats: Stats) {
        self.stats = stats;
    }

    /// Relays known to this server.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle a parsed request.
    pub async fn handle_request(&self, request: DirectoryRequest) -> DirectoryResponse {
        match request {
            DirectoryRequest::Register { relay } => {
                self.registry.register(relay).await;
                DirectoryResponse::Registered
            },
            DirectoryRequest::RequestCircuit { length } => {
                match self.registry.request_circuit(length).await {
                    Ok(relays) => DirectoryResponse::Circuit { relays },
                    Err(error) => {
                        warn!("Can't build circuit: {}", error);
                        DirectoryResponse::Error { error }
                    },
                }
            },
            DirectoryRequest::ListRelays => DirectoryResponse::Relays {
                relays: self.registry.list().await,
            },
        }
    }

    /// Handle raw request bytes. Malformed requests get an error response.
    pub async fn handle_frame(&self, frame: &[u8]) -> DirectoryResponse {
        match DirectoryRequest::from_wire(frame) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                debug!("Malformed directory request: {}", e);
                DirectoryResponse::Error { error: CdsError::Malformed }
            },
        }
    }

    /// Read one request from `stream` and answer it.
    pub async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), ConnectionError> {
        let mut framed = framed(stream, self.stats.clone());
        let frame = recv_frame(&mut framed, self.io_timeout).await
            .map_err(ConnectionError::Network)?;
        trace!("Directory request from {}: {} bytes", addr, frame.len());

        let response = self.handle_frame(&frame).await;
        let bytes = response.to_wire().map_err(ConnectionError::Encode)?;
        send_frame(&mut framed, bytes, self.io_timeout).await
            .map_err(ConnectionError::Network)
    }
}

/// Periodically remove relays that were not refreshed within `ttl`.
async fn run_eviction(registry: Registry, ttl: Duration) {
    let mut wakeups = tokio::time::interval(std::cmp::max(ttl / 2, Duration::from_millis(1)));
    loop {
        wakeups.tick().await;
        let evicted = registry.evict_expired().await;
        if evicted > 0 {
            debug!("Evicted {} expired relays", evicted);
        }
    }
}

/// Run directory server on `listener`.
pub async fn cds_run(server: &Server, listener: TcpListener, connections_limit: usize) -> Result<(), RunError> {
    let server_c = server.clone();
    let accept = serve(listener, connections_limit, move |stream, addr| {
        let server = server_c.clone();
        async move {
            if let Err(e) = server.handle_connection(stream, addr).await {
                debug!("Directory connection from {} failed: {}", addr, e);
            }
        }
    });

    match server.registry.ttl() {
        None => accept.await.map_err(RunError::Io),
        Some(ttl) => {
            let eviction = run_eviction(server.registry.clone(), ttl);
            futures::select! {
                res = accept.fuse() => res.map_err(RunError::Io),
                _ = eviction.fuse() => Ok(()),
            }
        },
    }
}
