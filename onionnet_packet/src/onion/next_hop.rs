/*! NextHop: decrypted content of an onion layer
*/

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use super::OnionLayer;
use crate::wire::*;

/** What a relay should do after opening its layer.

Encoded as a JSON header followed by raw bytes: the encoded next layer for
`Relay` or the application payload for `Exit`.

```text
{"hop":"relay"} <OnionLayer>
{"hop":"exit","destination":"127.0.0.1:9100"} <data>
```
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NextHop {
    /// Forward `layer` unchanged to the relay it addresses.
    Relay {
        /// Layer of the next relay.
        layer: OnionLayer,
    },
    /// Deliver `data` to the destination.
    Exit {
        /// Destination chosen by the client. When absent the relay uses its
        /// configured default destination.
        destination: Option<SocketAddr>,
        /// Application payload.
        data: Vec<u8>,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "hop", rename_all = "snake_case")]
enum Header {
    Relay,
    Exit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<SocketAddr>,
    },
}

impl Wire for NextHop {
    fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            NextHop::Relay { layer } => encode_with_body(&Header::Relay, &layer.to_wire()?),
            NextHop::Exit { destination, data } => encode_with_body(&Header::Exit { destination: *destination }, data),
        }
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        let (header, body) = decode_with_body(bytes)?;
        Ok(match header {
            Header::Relay => NextHop::Relay { layer: OnionLayer::from_wire(body)? },
            Header::Exit { destination } => NextHop::Exit { destination, data: body.to_vec() },
        })
    }
}
