/*! Relay node.

A relay knows only its predecessor's connection and the address of the next
hop. It owns a long-term key pair persisted in a keys file.
*/

pub mod keys;
mod errors;
mod node;
mod registration;

pub use self::errors::*;
pub use self::node::*;
pub use self::registration::*;
