/*! Client side of the directory protocol.
*/

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use onionnet_packet::directory::*;
use onionnet_packet::wire::Wire;

use super::errors::DirectoryClientError;
use crate::net::*;
use crate::stats::Stats;

/// Connection parameters of a directory server.
#[derive(Clone)]
pub struct DirectoryClient {
    addr: SocketAddr,
    timeout: Duration,
    stats: Stats,
}

impl DirectoryClient {
    /// Create client of the directory at `addr`.
    pub fn new(addr: SocketAddr) -> DirectoryClient {
        DirectoryClient {
            addr,
            timeout: DEFAULT_IO_TIMEOUT,
            stats: Stats::new(),
        }
    }

    /// Set timeout of a single request.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Address of the directory.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send `request` and return the response. Error responses are turned
    /// into `DirectoryClientError::Rejected`.
    pub async fn request(&self, request: &DirectoryRequest) -> Result<DirectoryResponse, DirectoryClientError> {
        let frame = request.to_wire().map_err(DirectoryClientError::Codec)?;
        let response = exchange(self.addr, frame, self.timeout, self.stats.clone()).await
            .map_err(DirectoryClientError::Network)?;
        match DirectoryResponse::from_wire(&response).map_err(DirectoryClientError::Codec)? {
            DirectoryResponse::Error { error } => Err(DirectoryClientError::Rejected(error)),
            response => Ok(response),
        }
    }

    /// Register `record` in the directory.
    pub async fn register(&self, record: &RelayRecord) -> Result<(), DirectoryClientError> {
        let request = DirectoryRequest::Register { relay: record.clone() };
        match self.request(&request).await? {
            DirectoryResponse::Registered => Ok(()),
            _ => Err(DirectoryClientError::UnexpectedResponse),
        }
    }

    /// Ask for a circuit of `length` distinct relays.
    pub async fn request_circuit(&self, length: usize) -> Result<Vec<RelayRecord>, DirectoryClientError> {
        let relays = match self.request(&DirectoryRequest::RequestCircuit { length }).await? {
            DirectoryResponse::Circuit { relays } => relays,
            _ => return Err(DirectoryClientError::UnexpectedResponse),
        };

        let distinct = relays.iter().map(RelayRecord::addr).collect::<HashSet<_>>().len();
        if relays.len() != length || distinct != length {
            return Err(DirectoryClientError::InvalidCircuit { requested: length, distinct })
        }

        Ok(relays)
    }

    /// List all relays known to the directory.
    pub async fn list_relays(&self) -> Result<Vec<RelayInfo>, DirectoryClientError> {
        match self.request(&DirectoryRequest::ListRelays).await? {
            DirectoryResponse::Relays { relays } => Ok(relays),
            _ => Err(DirectoryClientError::UnexpectedResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onionnet_crypto::generate_asymmetric_keypair;
    use tokio::net::TcpListener;

    use crate::directory::{cds_run, Registry, Server};

    fn record(port: u16) -> RelayRecord {
        RelayRecord::new(SocketAddr::new("127.0.0.1".parse().unwrap(), port), generate_asymmetric_keypair().pk)
    }

    async fn start_directory() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(Registry::new());
        tokio::spawn(async move { cds_run(&server, listener, DEFAULT_CONNECTIONS_LIMIT).await });
        addr
    }

    /// Fake directory answering every request with `response`.
    async fn start_fake_directory(response: DirectoryResponse) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, DEFAULT_CONNECTIONS_LIMIT, move |stream, _| {
            let response = response.clone();
            async move {
                let mut framed = framed(stream, Stats::new());
                if recv_frame(&mut framed, DEFAULT_IO_TIMEOUT).await.is_ok() {
                    let _ = send_frame(&mut framed, response.to_wire().unwrap(), DEFAULT_IO_TIMEOUT).await;
                }
            }
        }));
        addr
    }

    #[tokio::test]
    async fn register_and_request() {
        let client = DirectoryClient::new(start_directory().await);
        for port in 9101..9104 {
            client.register(&record(port)).await.unwrap();
        }

        let circuit = client.request_circuit(3).await.unwrap();
        assert_eq!(circuit.len(), 3);
        assert_eq!(client.list_relays().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn request_rejected() {
        let client = DirectoryClient::new(start_directory().await);
        client.register(&record(9101)).await.unwrap();

        let error = client.request_circuit(2).await.unwrap_err();
        assert_eq!(
            error.cds_error(),
            Some(&CdsError::InsufficientRelays { requested: 2, available: 1 })
        );
    }

    #[tokio::test]
    async fn duplicate_relays_are_refused() {
        let relay = record(9101);
        let addr = start_fake_directory(DirectoryResponse::Circuit { relays: vec![relay.clone(), relay] }).await;
        let client = DirectoryClient::new(addr);

        let error = client.request_circuit(2).await.unwrap_err();
        assert!(matches!(error, DirectoryClientError::InvalidCircuit { requested: 2, distinct: 1 }));
    }

    #[tokio::test]
    async fn unexpected_response() {
        let addr = start_fake_directory(DirectoryResponse::Registered).await;
        let client = DirectoryClient::new(addr);
        assert!(matches!(client.list_relays().await, Err(DirectoryClientError::UnexpectedResponse)));
    }

    #[tokio::test]
    async fn directory_unreachable() {
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let client = DirectoryClient::new(addr);
        assert!(matches!(client.request_circuit(1).await, Err(DirectoryClientError::Network(_))));
    }
}
