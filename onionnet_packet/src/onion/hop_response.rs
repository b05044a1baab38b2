/*! HopResponse: what a relay sends back upstream
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::*;

/// Reason a relay could not deliver the onion.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopFailure {
    /// Received bytes are not an onion layer.
    #[error("Malformed onion layer")]
    Malformed,
    /// Layer is not encrypted for this relay.
    #[error("Can't decrypt onion layer")]
    Decrypt,
    /// Exit relay has no destination to deliver to.
    #[error("No destination for exit traffic")]
    NoDestination,
    /// Next hop can't be reached.
    #[error("Next hop is unreachable")]
    Unreachable,
    /// Next hop did not answer in time.
    #[error("Next hop timed out")]
    Timeout,
    /// Connection was closed before the response arrived.
    #[error("Connection closed")]
    Closed,
    /// A relay further along the circuit failed.
    #[error("Downstream relay failed")]
    Downstream,
}

/** Response of a relay to its predecessor.

Serialized form:

```json
{"status":"data","payload":"<base64>"}
{"status":"failed","reason":"timeout"}
```
*/
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HopResponse {
    /// Response encrypted with this hop's session key.
    Data {
        /// Encrypted response.
        #[serde(with = "crate::encoding::base64_bytes")]
        payload: Vec<u8>,
    },
    /// Delivery failed. Never encrypted.
    Failed {
        /// Failure reason.
        reason: HopFailure,
    },
}

impl JsonWire for HopResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    wire_encode_decode_test!(
        data_encode_decode,
        HopResponse::Data { payload: vec![42; 64] }
    );

    wire_encode_decode_test!(
        failed_encode_decode,
        HopResponse::Failed { reason: HopFailure::Timeout }
    );

    #[test]
    fn failed_format() {
        let bytes = HopResponse::Failed { reason: HopFailure::NoDestination }.to_wire().unwrap();
        assert_eq!(bytes, br#"{"status":"failed","reason":"no_destination"}"#);
    }
}
