/*! Messages of the central directory server.

A connection to the directory carries exactly one `DirectoryRequest` and one
`DirectoryResponse`.
*/

mod relay_record;

pub use self::relay_record::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::*;

/// Default number of relays in a circuit.
pub const DEFAULT_CIRCUIT_LENGTH: usize = 3;

/** Request sent to the directory.

Serialized form:

```json
{"type":"register","relay":{..}}
{"type":"request_circuit","length":3}
{"type":"list_relays"}
```
*/
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryRequest {
    /// Add relay to the directory or refresh it.
    Register {
        /// Record of the registering relay.
        relay: RelayRecord,
    },
    /// Ask for `length` distinct relays.
    RequestCircuit {
        /// Number of relays in the circuit.
        length: usize,
    },
    /// Ask for all known relays.
    ListRelays,
}

impl JsonWire for DirectoryRequest {}

/// Error reported by the directory.
#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CdsError {
    /// Fewer relays are registered than the circuit needs.
    #[error("Not enough relays: requested {}, available {}", requested, available)]
    InsufficientRelays {
        /// Requested circuit length.
        requested: usize,
        /// Number of live relays.
        available: usize,
    },
    /// Circuit must contain at least one relay.
    #[error("Circuit length should be at least 1")]
    InvalidLength,
    /// The directory could not parse the request.
    #[error("Malformed directory request")]
    Malformed,
}

/// Response of the directory.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryResponse {
    /// Registration accepted.
    Registered,
    /// Relays of a new circuit, entry first.
    Circuit {
        /// Ordered relays.
        relays: Vec<RelayRecord>,
    },
    /// All live relays.
    Relays {
        /// Relays for display.
        relays: Vec<RelayInfo>,
    },
    /// Request failed.
    Error {
        /// Reason of the failure.
        error: CdsError,
    },
}

impl JsonWire for DirectoryResponse {}

#[cfg(test)]
mod tests {
    use super::*;
    use onionnet_crypto::generate_asymmetric_keypair;

    wire_encode_decode_test!(
        register_encode_decode,
        DirectoryRequest::Register {
            relay: RelayRecord::new("127.0.0.1:9101".parse().unwrap(), generate_asymmetric_keypair().pk),
        }
    );

    wire_encode_decode_test!(
        insufficient_relays_encode_decode,
        DirectoryResponse::Error {
            error: CdsError::InsufficientRelays { requested: 3, available: 1 },
        }
    );

    #[test]
    fn request_circuit_format() {
        let bytes = DirectoryRequest::RequestCircuit { length: 3 }.to_wire().unwrap();
        assert_eq!(bytes, br#"{"type":"request_circuit","length":3}"#);
    }

    #[test]
    fn list_relays_from_wire() {
        let request = DirectoryRequest::from_wire(br#"{"type":"list_relays"}"#).unwrap();
        assert_eq!(request, DirectoryRequest::ListRelays);
    }

    #[test]
    fn unknown_request_type() {
        let res = DirectoryRequest::from_wire(br#"{"type":"shutdown"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn negative_length_is_malformed() {
        let res = DirectoryRequest::from_wire(br#"{"type":"request_circuit","length":-1}"#);
        assert!(res.is_err());
    }
}
