/*! Central directory server.

Relays register here and clients ask for circuits. The registry is owned by
the `Server` instance and lives only in memory.
*/

mod client;
mod errors;
mod registry;
mod server;

pub use self::client::*;
pub use self::errors::*;
pub use self::registry::*;
pub use self::server::*;
