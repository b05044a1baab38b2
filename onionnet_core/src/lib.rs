/*!
Core of onionnet, a centrally coordinated onion routing network.

- [`directory`] keeps the list of relays and hands out circuits
- [`relay`] peels one layer of an onion and forwards the rest
- [`client`] builds onions and unwraps responses
- [`destination`] answers the innermost payload
*/

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod time;
pub mod stats;
pub mod codec;
pub mod net;
pub mod directory;
pub mod relay;
pub mod client;
pub mod destination;
