/*! RelayRecord and its display projection.
*/

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use onionnet_crypto::{fingerprint, PublicKey};
use serde::{Deserialize, Serialize};

use crate::wire::*;

/** Everything the directory knows about a relay.

Serialized form:

```json
{"id":"relay1","ip":"127.0.0.1","port":9101,"public_key":"<64 hex chars>"}
```

`id` is optional. A relay without an id is identified by its address.
*/
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RelayRecord {
    /// Operator-chosen name of the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// IP address the relay accepts onion connections on.
    pub ip: IpAddr,
    /// Port the relay accepts onion connections on.
    pub port: u16,
    /// Long-term public key of the relay.
    #[serde(with = "crate::encoding::hex_public_key")]
    pub public_key: PublicKey,
}

impl JsonWire for RelayRecord {}

/// Key of a relay inside the directory.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum RelayIdentity {
    /// Relay registered with an explicit id.
    Id(String),
    /// Relay registered without an id.
    Addr(SocketAddr),
}

impl fmt::Display for RelayIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RelayIdentity::Id(id) => write!(f, "{}", id),
            RelayIdentity::Addr(addr) => write!(f, "{}", addr),
        }
    }
}

impl RelayRecord {
    /// Create a record without an id.
    pub fn new(addr: SocketAddr, public_key: PublicKey) -> RelayRecord {
        RelayRecord {
            id: None,
            ip: addr.ip(),
            port: addr.port(),
            public_key,
        }
    }

    /// Attach an explicit id to the record.
    pub fn with_id<S: Into<String>>(mut self, id: S) -> RelayRecord {
        self.id = Some(id.into());
        self
    }

    /// Address of the relay.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Explicit id if present, the address otherwise.
    pub fn identity(&self) -> RelayIdentity {
        match self.id {
            Some(ref id) => RelayIdentity::Id(id.clone()),
            None => RelayIdentity::Addr(self.addr()),
        }
    }

    /// Human readable id. Relays without an explicit id are shown by port.
    pub fn display_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.port.to_string())
    }

    /// SHA-256 fingerprint of the public key.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public_key)
    }

    /// Projection of the record suitable for showing to users.
    pub fn info(&self) -> RelayInfo {
        RelayInfo {
            id: self.display_id(),
            ip: self.ip,
            port: self.port,
            fingerprint: self.fingerprint(),
        }
    }
}

/// Relay as shown to users. Carries a fingerprint instead of the key.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RelayInfo {
    /// Display id.
    pub id: String,
    /// IP address of the relay.
    pub ip: IpAddr,
    /// Port of the relay.
    pub port: u16,
    /// SHA-256 fingerprint of the relay's public key.
    pub fingerprint: String,
}

impl RelayInfo {
    /// Address of the relay.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl JsonWire for RelayInfo {}
