/*! The implementation of the relay node

Every connection goes through the states of `RelayState`: one `OnionLayer` is
read from the predecessor, opened with the relay's secret key and its inner
part is forwarded. The response of the next hop is encrypted with the layer's
session key and sent back. Any failure is reported upstream as
`HopResponse::Failed` and nothing is forwarded after it.
*/

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use onionnet_crypto::*;
use onionnet_packet::directory::RelayRecord;
use onionnet_packet::onion::*;
use onionnet_packet::wire::Wire;
use tokio::net::{TcpListener, TcpStream};

use super::errors::*;
use crate::net::*;
use crate::stats::Stats;

/// Relay node. Clones share the key pair.
#[derive(Clone)]
pub struct Relay {
    keys: Arc<KeyPair>,
    destination: Option<SocketAddr>,
    io_timeout: Duration,
    stats: Stats,
}

impl Relay {
    /// Create new `Relay` with long-term `keys`.
    pub fn new(keys: KeyPair) -> Relay {
        Relay {
            keys: Arc::new(keys),
            destination: None,
            io_timeout: DEFAULT_IO_TIMEOUT,
            stats: Stats::new(),
        }
    }

    /// Set destination used for exit layers that don't name one.
    pub fn set_destination(&mut self, destination: Option<SocketAddr>) {
        self.destination = destination;
    }

    /// Set timeout for every read, write and connect of a connection.
    pub fn set_io_timeout(&mut self, io_timeout: Duration) {
        self.io_timeout = io_timeout;
    }

    /// Set stats shared by all connections.
    pub fn set_stats(&mut self, stats: Stats) {
        self.stats = stats;
    }

    /// Long-term public key of the relay.
    pub fn public_key(&self) -> &PublicKey {
        &self.keys.pk
    }

    /// Record announced to the directory for a relay reachable at `addr`.
    pub fn record(&self, addr: SocketAddr, id: Option<String>) -> RelayRecord {
        let record = RelayRecord::new(addr, self.keys.pk.clone());
        match id {
            Some(id) => record.with_id(id),
            None => record,
        }
    }

    /// Deliver the content of an opened layer and return the raw response.
    async fn forward(&self, next_hop: NextHop) -> Result<Vec<u8>, RelayError> {
        match next_hop {
            NextHop::Relay { layer } => {
                let addr = layer.addr();
                let frame = layer.to_wire().map_err(RelayError::Encode)?;
                trace!("Forwarding onion layer to relay {}", addr);
                let response = exchange(addr, frame, self.io_timeout, self.stats.clone()).await
                    .map_err(|error| RelayError::Forward { addr, error })?;
                match HopResponse::from_wire(&response).map_err(RelayError::MalformedResponse)? {
                    HopResponse::Data { payload } => Ok(payload),
                    HopResponse::Failed { reason } => Err(RelayError::Downstream { addr, reason }),
                }
            },
            NextHop::Exit { destination, data } => {
                let addr = destination.or(self.destination).ok_or(RelayError::NoDestination)?;
                trace!("Delivering {} bytes to destination {}", data.len(), addr);
                exchange(addr, data, self.io_timeout, self.stats.clone()).await
                    .map_err(|error| RelayError::Forward { addr, error })
            },
        }
    }

    /// Run a connection up to the `Returning` state. The session key is
    /// dropped, and zeroed, when this function returns.
    async fn process(&self, framed: &mut FramedStream) -> Result<Vec<u8>, RelayError> {
        let frame = recv_frame(framed, self.io_timeout).await
            .map_err(RelayError::ReadLayer)?;
        let layer = OnionLayer::from_wire(&frame).map_err(RelayError::MalformedLayer)?;

        let (session_key, next_hop) = layer.get_payload(&self.keys.sk).map_err(RelayError::Open)?;

        let response = self.forward(next_hop).await?;

        sym_encrypt(&session_key, &response).map_err(RelayError::Encrypt)
    }

    /// Handle one connection from a predecessor.
    pub async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), RelayError> {
        let mut framed = framed(stream, self.stats.clone());

        match self.process(&mut framed).await {
            Ok(payload) => {
                let response = HopResponse::Data { payload }.to_wire().map_err(RelayError::Encode)?;
                send_frame(&mut framed, response, self.io_timeout).await
                    .map_err(RelayError::Return)?;
                trace!("Relayed response to {}", addr);
                Ok(())
            },
            Err(error) => {
                let reason = error.failure();
                // best effort, the predecessor may be gone already
                if let Ok(response) = (HopResponse::Failed { reason }).to_wire() {
                    if let Err(e) = send_frame(&mut framed, response, self.io_timeout).await {
                        trace!("Failed to report '{}' to {}: {}", reason, addr, e);
                    }
                }
                Err(error)
            },
        }
    }
}

/// Run relay on `listener`.
pub async fn relay_run(relay: &Relay, listener: TcpListener, connections_limit: usize) -> Result<(), RunError> {
    let relay = relay.clone();
    serve(listener, connections_limit, move |stream, addr| {
        let relay = relay.clone();
        async move {
            if let Err(e) = relay.handle_connection(stream, addr).await {
                debug!("Relay connection from {} failed in state {:?}: {}", addr, e.state(), e);
            }
        }
    }).await.map_err(RunError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start_relay(relay: Relay) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { relay_run(&relay, listener, DEFAULT_CONNECTIONS_LIMIT).await });
        addr
    }

    /// Destination that answers every frame with the frame itself prefixed
    /// by `echo:`.
    async fn start_echo() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, DEFAULT_CONNECTIONS_LIMIT, |stream, _| async move {
            let mut framed = framed(stream, Stats::new());
            if let Ok(frame) = recv_frame(&mut framed, DEFAULT_IO_TIMEOUT).await {
                let mut response = b"echo:".to_vec();
                response.extend_from_slice(&frame);
                let _ = send_frame(&mut framed, response, DEFAULT_IO_TIMEOUT).await;
            }
        }));
        addr
    }

    async fn send(addr: SocketAddr, frame: Vec<u8>) -> HopResponse {
        let response = exchange(addr, frame, DEFAULT_IO_TIMEOUT, Stats::new()).await.unwrap();
        HopResponse::from_wire(&response).unwrap()
    }

    fn exit_layer(keys: &KeyPair, addr: SocketAddr, session_key: &SessionKey, destination: Option<SocketAddr>) -> OnionLayer {
        let next_hop = NextHop::Exit { destination, data: b"hello".to_vec() };
        OnionLayer::new(&keys.pk, addr, session_key, &next_hop).unwrap()
    }

    #[tokio::test]
    async fn exit_relay_delivers() {
        let destination = start_echo().await;
        let keys = generate_asymmetric_keypair();
        let addr = start_relay(Relay::new(keys.clone())).await;

        let session_key = generate_symmetric_key();
        let layer = exit_layer(&keys, addr, &session_key, Some(destination));

        match send(addr, layer.to_wire().unwrap()).await {
            HopResponse::Data { payload } => {
                assert_eq!(sym_decrypt(&session_key, &payload).unwrap(), b"echo:hello");
            },
            other => panic!("Unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn exit_relay_uses_default_destination() {
        let destination = start_echo().await;
        let keys = generate_asymmetric_keypair();
        let mut relay = Relay::new(keys.clone());
        relay.set_destination(Some(destination));
        let addr = start_relay(relay).await;

        let session_key = generate_symmetric_key();
        let layer = exit_layer(&keys, addr, &session_key, None);

        assert!(matches!(send(addr, layer.to_wire().unwrap()).await, HopResponse::Data { .. }));
    }

    #[tokio::test]
    async fn exit_relay_without_destination() {
        let keys = generate_asymmetric_keypair();
        let addr = start_relay(Relay::new(keys.clone())).await;

        let layer = exit_layer(&keys, addr, &generate_symmetric_key(), None);

        assert_eq!(
            send(addr, layer.to_wire().unwrap()).await,
            HopResponse::Failed { reason: HopFailure::NoDestination }
        );
    }

    #[tokio::test]
    async fn two_relays() {
        let destination = start_echo().await;
        let keys_1 = generate_asymmetric_keypair();
        let keys_2 = generate_asymmetric_keypair();
        let addr_1 = start_relay(Relay::new(keys_1.clone())).await;
        let addr_2 = start_relay(Relay::new(keys_2.clone())).await;

        let session_key_1 = generate_symmetric_key();
        let session_key_2 = generate_symmetric_key();
        let inner = exit_layer(&keys_2, addr_2, &session_key_2, Some(destination));
        let outer = OnionLayer::new(&keys_1.pk, addr_1, &session_key_1, &NextHop::Relay { layer: inner }).unwrap();

        match send(addr_1, outer.to_wire().unwrap()).await {
            HopResponse::Data { payload } => {
                let payload = sym_decrypt(&session_key_1, &payload).unwrap();
                assert_eq!(sym_decrypt(&session_key_2, &payload).unwrap(), b"echo:hello");
            },
            other => panic!("Unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn downstream_failure_is_reported() {
        let keys_1 = generate_asymmetric_keypair();
        let keys_2 = generate_asymmetric_keypair();
        let addr_1 = start_relay(Relay::new(keys_1.clone())).await;
        let addr_2 = start_relay(Relay::new(keys_2.clone())).await;

        let inner = exit_layer(&keys_2, addr_2, &generate_symmetric_key(), None);
        let outer = OnionLayer::new(&keys_1.pk, addr_1, &generate_symmetric_key(), &NextHop::Relay { layer: inner }).unwrap();

        assert_eq!(
            send(addr_1, outer.to_wire().unwrap()).await,
            HopResponse::Failed { reason: HopFailure::Downstream }
        );
    }

    #[tokio::test]
    async fn wrong_key_fails_closed() {
        // the layer points to a listener that must never be contacted
        let next = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let next_addr = next.local_addr().unwrap();

        let keys = generate_asymmetric_keypair();
        let addr = start_relay(Relay::new(keys)).await;

        let stranger = generate_asymmetric_keypair();
        let layer = exit_layer(&stranger, addr, &generate_symmetric_key(), Some(next_addr));

        assert_eq!(
            send(addr, layer.to_wire().unwrap()).await,
            HopResponse::Failed { reason: HopFailure::Decrypt }
        );
        assert!(tokio::time::timeout(Duration::from_millis(100), next.accept()).await.is_err());
    }

    #[tokio::test]
    async fn malformed_layer() {
        let addr = start_relay(Relay::new(generate_asymmetric_keypair())).await;

        assert_eq!(
            send(addr, b"definitely not a layer".to_vec()).await,
            HopResponse::Failed { reason: HopFailure::Malformed }
        );
        // relay keeps serving
        assert_eq!(
            send(addr, vec![0xff, 0x00]).await,
            HopResponse::Failed { reason: HopFailure::Malformed }
        );
    }

    #[tokio::test]
    async fn unreachable_destination() {
        let destination = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let keys = generate_asymmetric_keypair();
        let addr = start_relay(Relay::new(keys.clone())).await;

        let layer = exit_layer(&keys, addr, &generate_symmetric_key(), Some(destination));

        assert_eq!(
            send(addr, layer.to_wire().unwrap()).await,
            HopResponse::Failed { reason: HopFailure::Unreachable }
        );
    }

    #[tokio::test]
    async fn silent_destination_times_out() {
        let destination = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let destination_addr = destination.local_addr().unwrap();
        let keys = generate_asymmetric_keypair();
        let mut relay = Relay::new(keys.clone());
        relay.set_io_timeout(Duration::from_millis(100));
        let addr = start_relay(relay).await;

        let layer = exit_layer(&keys, addr, &generate_symmetric_key(), Some(destination_addr));

        assert_eq!(
            send(addr, layer.to_wire().unwrap()).await,
            HopResponse::Failed { reason: HopFailure::Timeout }
        );
        drop(destination);
    }

    #[test]
    fn record_with_id() {
        let relay = Relay::new(generate_asymmetric_keypair());
        let addr = "127.0.0.1:9101".parse().unwrap();

        let record = relay.record(addr, Some("relay1".to_owned()));
        assert_eq!(record.addr(), addr);
        assert_eq!(&record.public_key, relay.public_key());
        assert_eq!(record.display_id(), "relay1");
        assert_eq!(relay.record(addr, None).display_id(), "9101");
    }
}
