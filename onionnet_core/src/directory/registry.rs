/*! In-memory list of relays known to the directory.
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use itertools::Itertools;
use onionnet_packet::directory::*;
use rand::seq::SliceRandom;
use rand::thread_rng;
use tokio::sync::RwLock;

use crate::time::*;

#[derive(Clone, Debug)]
struct Entry {
    record: RelayRecord,
    refreshed: Instant,
}

/** Relays registered with one directory server.

Relays are keyed by their identity. A registration replaces the previous
record with the same identity and evicts records of other relays that
advertise the same address, so an address is never listed twice.

When a TTL is set records that were not refreshed within it are invisible
and are removed by `evict_expired`.
*/
#[derive(Clone, Default)]
pub struct Registry {
    relays: Arc<RwLock<HashMap<RelayIdentity, Entry>>>,
    ttl: Option<Duration>,
}

impl Registry {
    /// Create registry where records never expire.
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Create registry where records expire after `ttl` without refresh.
    pub fn with_ttl(ttl: Duration) -> Registry {
        Registry {
            relays: Arc::default(),
            ttl: Some(ttl),
        }
    }

    /// TTL of records.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_alive(&self, entry: &Entry, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(entry.refreshed) < ttl,
            None => true,
        }
    }

    /// Add a relay or refresh its record. Returns `true` if the relay was not
    /// known before.
    pub async fn register(&self, record: RelayRecord) -> bool {
        let identity = record.identity();
        let addr = record.addr();
        let public_key = record.public_key.clone();
        let mut relays = self.relays.write().await;

        relays.retain(|id, entry| {
            let same_addr = *id != identity && entry.record.addr() == addr;
            if same_addr {
                info!("Relay {} is replaced by {} at {}", id, identity, addr);
            }
            !same_addr
        });

        let entry = Entry {
            record,
            refreshed: clock_now(),
        };
        match relays.insert(identity.clone(), entry) {
            None => {
                info!("Registered relay {} at {}", identity, addr);
                true
            },
            Some(previous) => {
                if previous.record.public_key != public_key {
                    info!("Relay {} at {} updated its public key", identity, addr);
                } else {
                    debug!("Relay {} at {} refreshed", identity, addr);
                }
                false
            },
        }
    }

    /** Choose `length` distinct relays uniformly at random.

    Relays are chosen without replacement from one consistent snapshot of the
    registry, the order of the result is random too. Fails without any side
    effect when `length` is zero or when fewer relays are alive.
    */
    pub async fn request_circuit(&self, length: usize) -> Result<Vec<RelayRecord>, CdsError> {
        if length == 0 {
            return Err(CdsError::InvalidLength)
        }

        let now = clock_now();
        let relays = self.relays.read().await;
        let mut candidates = relays.values()
            .filter(|entry| self.is_alive(entry, now))
            .map(|entry| &entry.record)
            .unique_by(|record| record.addr())
            .collect::<Vec<_>>();

        if candidates.len() < length {
            return Err(CdsError::InsufficientRelays {
                requested: length,
                available: candidates.len(),
            })
        }

        let (chosen, _) = candidates.partial_shuffle(&mut thread_rng(), length);
        let circuit = chosen.iter().map(|&record| record.clone()).collect::<Vec<_>>();

        debug!("Circuit of {} relays: {}", length, circuit.iter().map(RelayRecord::addr).format(" -> "));

        Ok(circuit)
    }

    /// All live relays ordered by address.
    pub async fn list(&self) -> Vec<RelayInfo> {
        let now = clock_now();
        let relays = self.relays.read().await;
        relays.values()
            .filter(|entry| self.is_alive(entry, now))
            .map(|entry| entry.record.info())
            .sorted_by_key(RelayInfo::addr)
            .collect()
    }

    /// Number of live relays.
    pub async fn len(&self) -> usize {
        let now = clock_now();
        let relays = self.relays.read().await;
        relays.values().filter(|entry| self.is_alive(entry, now)).count()
    }

    /// Check if no relay is alive.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove expired records. Returns number of removed records.
    pub async fn evict_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0
        }

        let now = clock_now();
        let mut relays = self.relays.write().await;
        let before = relays.len();
        relays.retain(|identity, entry| {
            let alive = self.is_alive(entry, now);
            if !alive {
                info!("Relay {} at {} expired", identity, entry.record.addr());
            }
            alive
        });
        before - relays.len()
    }
}
