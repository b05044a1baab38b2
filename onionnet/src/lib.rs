//! This crate rexports all onionnet crates.

pub use onionnet_core as core;
pub use onionnet_crypto as crypto;
pub use onionnet_packet as packet;
