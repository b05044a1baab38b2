/*!
Messages exchanged by the nodes of an onionnet network.

Most messages are JSON documents. Binary fields are base64 strings and public
keys are hex strings. Onion layers nest inside each other, so they are a JSON
header followed by raw bytes instead. Use [`Wire`](crate::wire::Wire) to turn a
message into bytes and back.
*/

#![forbid(unsafe_code)]

#[cfg(test)]
#[macro_use]
mod macros;

mod encoding;
pub mod wire;
pub mod directory;
pub mod onion;
pub mod destination;
