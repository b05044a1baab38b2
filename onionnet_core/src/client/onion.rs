/*! Building onions and unwrapping responses.
*/

use std::net::SocketAddr;

use onionnet_crypto::*;
use onionnet_packet::directory::RelayRecord;
use onionnet_packet::onion::*;

use super::errors::BuildError;

/// Onion ready to be sent to the first relay of its circuit.
#[derive(Clone, Debug)]
pub struct Onion {
    /// Outermost layer. It addresses the first relay.
    pub layer: OnionLayer,
    /// Session keys of the layers in circuit order, first relay first.
    pub session_keys: Vec<SessionKey>,
}

impl Onion {
    /// Address of the first relay.
    pub fn entry(&self) -> SocketAddr {
        self.layer.addr()
    }
}

/** Wrap `plaintext` into one layer per relay.

Layers are sealed innermost first: the exit relay's layer carries the
plaintext and `destination`, every other layer carries the layer of the next
relay. A fresh session key is generated for every layer.
*/
pub fn build_onion(relays: &[RelayRecord], plaintext: &[u8], destination: Option<SocketAddr>) -> Result<Onion, BuildError> {
    let (exit, rest) = relays.split_last().ok_or(BuildError::EmptyCircuit)?;

    let mut session_keys = Vec::with_capacity(relays.len());

    let session_key = generate_symmetric_key();
    let next_hop = NextHop::Exit { destination, data: plaintext.to_vec() };
    let mut layer = OnionLayer::new(&exit.public_key, exit.addr(), &session_key, &next_hop)
        .map_err(BuildError::Seal)?;
    session_keys.push(session_key);

    for relay in rest.iter().rev() {
        let session_key = generate_symmetric_key();
        let next_hop = NextHop::Relay { layer };
        layer = OnionLayer::new(&relay.public_key, relay.addr(), &session_key, &next_hop)
            .map_err(BuildError::Seal)?;
        session_keys.push(session_key);
    }

    session_keys.reverse();
    Ok(Onion { layer, session_keys })
}

/// Remove the encryption added by every relay on the way back. The first
/// relay encrypted last so its key is applied first.
pub fn unwrap_response(payload: &[u8], session_keys: &[SessionKey]) -> Result<Vec<u8>, CryptoError> {
    session_keys.iter().try_fold(payload.to_vec(), |data, key| sym_decrypt(key, &data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circuit(len: usize) -> (Vec<RelayRecord>, Vec<KeyPair>) {
        (0..len).map(|i| {
            let keys = generate_asymmetric_keypair();
            let addr = SocketAddr::new("127.0.0.1".parse().unwrap(), 9101 + i as u16);
            (RelayRecord::new(addr, keys.pk.clone()), keys)
        }).unzip()
    }

    /// Peel the onion the way relays do and return the exit hop.
    fn peel(onion: &Onion, keys: &[KeyPair]) -> NextHop {
        let mut layer = onion.layer.clone();
        for (i, relay_keys) in keys.iter().enumerate() {
            let (session_key, next_hop) = layer.get_payload(&relay_keys.sk).unwrap();
            assert_eq!(session_key, onion.session_keys[i]);
            match next_hop {
                NextHop::Relay { layer: next } => layer = next,
                exit => {
                    assert_eq!(i, keys.len() - 1);
                    return exit
                },
            }
        }
        panic!("Onion has no exit layer")
    }

    #[test]
    fn build_and_peel() {
        let (relays, keys) = circuit(3);
        let destination = Some("127.0.0.1:9100".parse().unwrap());
        let onion = build_onion(&relays, b"hello", destination).unwrap();

        assert_eq!(onion.entry(), relays[0].addr());
        assert_eq!(onion.session_keys.len(), 3);
        assert_eq!(peel(&onion, &keys), NextHop::Exit { destination, data: b"hello".to_vec() });
    }

    #[test]
    fn single_relay() {
        let (relays, keys) = circuit(1);
        let onion = build_onion(&relays, b"hello", None).unwrap();

        assert_eq!(onion.session_keys.len(), 1);
        assert_eq!(peel(&onion, &keys), NextHop::Exit { destination: None, data: b"hello".to_vec() });
    }

    #[test]
    fn empty_circuit() {
        assert_eq!(build_onion(&[], b"hello", None).unwrap_err(), BuildError::EmptyCircuit);
    }

    #[test]
    fn layer_isolation() {
        let (relays, keys) = circuit(3);
        let onion = build_onion(&relays, b"hello", None).unwrap();

        let (_, next_hop) = onion.layer.get_payload(&keys[0].sk).unwrap();
        let second = match next_hop {
            NextHop::Relay { layer } => layer,
            other => panic!("Unexpected next hop {:?}", other),
        };

        for stranger in [&keys[0], &keys[2]] {
            assert_eq!(
                second.get_payload(&stranger.sk).unwrap_err(),
                GetPayloadError::SessionKey(CryptoError::BadCiphertext)
            );
        }
        assert!(second.get_payload(&keys[1].sk).is_ok());
    }

    #[test]
    fn fresh_session_keys() {
        let (relays, _) = circuit(2);
        let first = build_onion(&relays, b"hello", None).unwrap();
        let second = build_onion(&relays, b"hello", None).unwrap();

        assert_ne!(first.session_keys[0], first.session_keys[1]);
        assert_ne!(first.session_keys[0], second.session_keys[0]);
        assert_ne!(first.layer.payload, second.layer.payload);
    }

    #[test]
    fn unwrap_in_circuit_order() {
        let keys = vec![generate_symmetric_key(), generate_symmetric_key(), generate_symmetric_key()];
        // the exit relay encrypts first, the entry relay last
        let payload = keys.iter().rev().fold(b"response".to_vec(), |data, key| sym_encrypt(key, &data).unwrap());

        assert_eq!(unwrap_response(&payload, &keys).unwrap(), b"response");

        let reversed = keys.iter().rev().cloned().collect::<Vec<_>>();
        assert_eq!(unwrap_response(&payload, &reversed).unwrap_err(), CryptoError::BadCiphertext);
    }
}
