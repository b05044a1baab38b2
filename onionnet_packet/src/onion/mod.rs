/*! Onion messages

The client wraps its payload into one `OnionLayer` per relay. Each relay opens
exactly one layer with its secret key and learns only a `NextHop`: either the
next layer together with the address of the next relay, or the final payload
for the destination. Responses travel back as `HopResponse`.
*/

mod errors;
mod hop_response;
mod next_hop;
mod onion_layer;

pub use self::errors::*;
pub use self::hop_response::*;
pub use self::next_hop::*;
pub use self::onion_layer::*;
