/*! Registration of a relay in the directory.
*/

use std::time::Duration;

use onionnet_packet::directory::RelayRecord;
use tokio::time;

use super::errors::RegisterError;
use crate::directory::DirectoryClient;

/// Default number of registration attempts on startup.
pub const DEFAULT_REGISTRATION_ATTEMPTS: u32 = 5;

/// Default delay between two registration attempts.
pub const DEFAULT_REGISTRATION_DELAY: Duration = Duration::from_secs(1);

/// Register `record` in the directory making at most `attempts` attempts
/// separated by `delay`.
pub async fn register_relay(
    client: &DirectoryClient,
    record: &RelayRecord,
    attempts: u32,
    delay: Duration,
) -> Result<(), RegisterError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.register(record).await {
            Ok(()) => {
                info!("Relay {} registered in directory {}", record.display_id(), client.addr());
                return Ok(())
            },
            Err(source) if attempt >= attempts => {
                return Err(RegisterError::Exhausted { attempts: attempt, source })
            },
            Err(e) => {
                warn!(
                    "Registration attempt {}/{} of relay {} failed: {}",
                    attempt, attempts, record.display_id(), e
                );
                time::sleep(delay).await;
            },
        }
    }
}

/// Shortest interval between two heartbeats.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Re-register `record` every `interval` so that the directory doesn't
/// evict it. Never returns.
pub async fn heartbeat(client: DirectoryClient, record: RelayRecord, interval: Duration) {
    if interval < MIN_HEARTBEAT_INTERVAL {
        warn!("Heartbeat interval {:?} is too short, using {:?}", interval, MIN_HEARTBEAT_INTERVAL);
    }
    let mut wakeups = time::interval(interval.max(MIN_HEARTBEAT_INTERVAL));
    // the first tick completes immediately and the relay was just registered
    wakeups.tick().await;
    loop {
        wakeups.tick().await;
        match client.register(&record).await {
            Ok(()) => trace!("Relay {} refreshed in directory", record.display_id()),
            Err(e) => warn!("Failed to refresh relay {} in directory: {}", record.display_id(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use onionnet_crypto::generate_asymmetric_keypair;
    use onionnet_packet::directory::*;
    use onionnet_packet::wire::Wire;
    use tokio::net::TcpListener;

    use crate::directory::DirectoryClientError;
    use crate::net::*;
    use crate::stats::Stats;

    fn record() -> RelayRecord {
        RelayRecord::new("127.0.0.1:9101".parse().unwrap(), generate_asymmetric_keypair().pk)
    }

    /// Directory that rejects the first `failures` requests. Returns its
    /// address and the number of requests received.
    async fn start_flaky_directory(failures: usize) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let requests_c = requests.clone();
        tokio::spawn(serve(listener, DEFAULT_CONNECTIONS_LIMIT, move |stream, _| {
            let requests = requests_c.clone();
            async move {
                let mut framed = framed(stream, Stats::new());
                if recv_frame(&mut framed, DEFAULT_IO_TIMEOUT).await.is_ok() {
                    let response = if requests.fetch_add(1, Ordering::SeqCst) < failures {
                        DirectoryResponse::Error { error: CdsError::Malformed }
                    } else {
                        DirectoryResponse::Registered
                    };
                    let _ = send_frame(&mut framed, response.to_wire().unwrap(), DEFAULT_IO_TIMEOUT).await;
                }
            }
        }));
        (addr, requests)
    }

    #[tokio::test]
    async fn register_after_retries() {
        let (addr, requests) = start_flaky_directory(2).await;
        let client = DirectoryClient::new(addr);

        register_relay(&client, &record(), 3, Duration::from_millis(10)).await.unwrap();
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn register_exhausted() {
        let (addr, requests) = start_flaky_directory(usize::MAX).await;
        let client = DirectoryClient::new(addr);

        let error = register_relay(&client, &record(), 3, Duration::from_millis(10)).await.unwrap_err();
        let RegisterError::Exhausted { attempts, source } = error;
        assert_eq!(attempts, 3);
        assert!(matches!(source, DirectoryClientError::Rejected(CdsError::Malformed)));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn register_unreachable_directory() {
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let client = DirectoryClient::new(addr);

        let error = register_relay(&client, &record(), 2, Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(
            error,
            RegisterError::Exhausted { attempts: 2, source: DirectoryClientError::Network(_) }
        ));
    }

    #[tokio::test]
    async fn heartbeat_refreshes() {
        let (addr, requests) = start_flaky_directory(0).await;
        let client = DirectoryClient::new(addr);

        let heartbeat = tokio::spawn(heartbeat(client, record(), Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(150)).await;
        heartbeat.abort();

        assert!(requests.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn heartbeat_with_zero_interval() {
        let (addr, requests) = start_flaky_directory(0).await;
        let client = DirectoryClient::new(addr);

        let heartbeat = tokio::spawn(heartbeat(client, record(), Duration::ZERO));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!heartbeat.is_finished());
        heartbeat.abort();

        assert!(heartbeat.await.unwrap_err().is_cancelled());
        assert!(requests.load(Ordering::SeqCst) >= 1);
    }
}
