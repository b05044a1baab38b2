/*! OnionLayer packet
*/

use std::net::{IpAddr, SocketAddr};

use onionnet_crypto::*;
use serde::{Deserialize, Serialize};

use super::*;
use crate::wire::*;

/** One layer of an onion.

`next_ip`/`next_port` address the relay this layer is meant for. The
relay decrypts `session_key` with its secret key and uses the result to
decrypt `payload` into a `NextHop`.

Encoded as a JSON header followed by the raw `payload`:

```text
{"next_ip":"127.0.0.1","next_port":9101,"session_key":"<base64>"} <payload>
```
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OnionLayer {
    /// IP address of the relay holding this layer.
    pub next_ip: IpAddr,
    /// Port of the relay holding this layer.
    pub next_port: u16,
    /// Session key encrypted with the relay's public key.
    pub session_key: Vec<u8>,
    /// `NextHop` encrypted with the session key.
    pub payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Header {
    next_ip: IpAddr,
    next_port: u16,
    #[serde(with = "crate::encoding::base64_bytes")]
    session_key: Vec<u8>,
}

impl Wire for OnionLayer {
    fn to_wire(&self) -> Result<Vec<u8>, CodecError> {
        let header = Header {
            next_ip: self.next_ip,
            next_port: self.next_port,
            session_key: self.session_key.clone(),
        };
        encode_with_body(&header, &self.payload)
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, CodecError> {
        let (header, payload): (Header, _) = decode_with_body(bytes)?;
        Ok(OnionLayer {
            next_ip: header.next_ip,
            next_port: header.next_port,
            session_key: header.session_key,
            payload: payload.to_vec(),
        })
    }
}

impl OnionLayer {
    /// Seal `next_hop` for the relay with public key `pk` listening on `addr`.
    pub fn new(pk: &PublicKey, addr: SocketAddr, session_key: &SessionKey, next_hop: &NextHop) -> Result<OnionLayer, SealError> {
        let plaintext = next_hop.to_wire().map_err(SealError::Serialize)?;
        let payload = sym_encrypt(session_key, &plaintext).map_err(SealError::Encrypt)?;
        let session_key = asym_encrypt(pk, session_key.as_bytes()).map_err(SealError::Encrypt)?;

        Ok(OnionLayer {
            next_ip: addr.ip(),
            next_port: addr.port(),
            session_key,
            payload,
        })
    }

    /** Recover the session key and decrypt the payload.

    Returns `Error` in case of failure:

    - session key is not encrypted for `sk`
    - payload is not encrypted with the session key
    - decrypted payload is not a `NextHop`
    */
    pub fn get_payload(&self, sk: &SecretKey) -> Result<(SessionKey, NextHop), GetPayloadError> {
        let key_bytes = asym_decrypt(sk, &self.session_key).map_err(GetPayloadError::SessionKey)?;
        let session_key = SessionKey::from_slice(&key_bytes).map_err(GetPayloadError::SessionKey)?;
        let decrypted = sym_decrypt(&session_key, &self.payload).map_err(GetPayloadError::Decrypt)?;
        let next_hop = NextHop::from_wire(&decrypted).map_err(GetPayloadError::Deserialize)?;
        Ok((session_key, next_hop))
    }

    /// Address of the relay holding this layer.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.next_ip, self.next_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_hop() -> NextHop {
        NextHop::Exit {
            destination: Some("127.0.0.1:9100".parse().unwrap()),
            data: br#"{"msg":"Hello, world!"}"#.to_vec(),
        }
    }

    wire_encode_decode_test!(
        onion_layer_encode_decode,
        OnionLayer {
            next_ip: "127.0.0.1".parse().unwrap(),
            next_port: 9101,
            session_key: vec![42; 88],
            payload: vec![43; 123],
        }
    );

    #[test]
    fn seal_open() {
        let keys = generate_asymmetric_keypair();
        let session_key = generate_symmetric_key();
        let addr = "127.0.0.1:9101".parse().unwrap();
        let layer = OnionLayer::new(&keys.pk, addr, &session_key, &exit_hop()).unwrap();
        assert_eq!(layer.addr(), addr);

        let (recovered_key, next_hop) = layer.get_payload(&keys.sk).unwrap();
        assert_eq!(recovered_key, session_key);
        assert_eq!(next_hop, exit_hop());
    }

    #[test]
    fn open_with_invalid_key() {
        let keys = generate_asymmetric_keypair();
        let eve = generate_asymmetric_keypair();
        let session_key = generate_symmetric_key();
        let layer = OnionLayer::new(&keys.pk, "127.0.0.1:9101".parse().unwrap(), &session_key, &exit_hop()).unwrap();

        assert_eq!(
            layer.get_payload(&eve.sk).unwrap_err(),
            GetPayloadError::SessionKey(CryptoError::BadCiphertext)
        );
    }

    #[test]
    fn open_with_swapped_payload() {
        let keys = generate_asymmetric_keypair();
        let addr = "127.0.0.1:9101".parse().unwrap();
        let mut layer = OnionLayer::new(&keys.pk, addr, &generate_symmetric_key(), &exit_hop()).unwrap();
        let other = OnionLayer::new(&keys.pk, addr, &generate_symmetric_key(), &exit_hop()).unwrap();
        layer.payload = other.payload;

        assert_eq!(
            layer.get_payload(&keys.sk).unwrap_err(),
            GetPayloadError::Decrypt(CryptoError::BadCiphertext)
        );
    }

    #[test]
    fn open_invalid_next_hop() {
        let keys = generate_asymmetric_keypair();
        let session_key = generate_symmetric_key();
        let layer = OnionLayer {
            next_ip: "127.0.0.1".parse().unwrap(),
            next_port: 9101,
            session_key: asym_encrypt(&keys.pk, session_key.as_bytes()).unwrap(),
            payload: sym_encrypt(&session_key, b"not a next hop").unwrap(),
        };

        assert!(matches!(layer.get_payload(&keys.sk), Err(GetPayloadError::Deserialize(_))));
    }

    #[test]
    fn open_short_session_key() {
        let keys = generate_asymmetric_keypair();
        let layer = OnionLayer {
            next_ip: "127.0.0.1".parse().unwrap(),
            next_port: 9101,
            session_key: asym_encrypt(&keys.pk, &[1; 16]).unwrap(),
            payload: vec![],
        };

        assert_eq!(
            layer.get_payload(&keys.sk).unwrap_err(),
            GetPayloadError::SessionKey(CryptoError::InvalidKeyLength { len: 16 })
        );
    }

    #[test]
    fn invalid_base64_session_key() {
        let header = br#"{"next_ip":"127.0.0.1","next_port":9101,"session_key":"!!"}"#;
        let mut bytes = (header.len() as u16).to_be_bytes().to_vec();
        bytes.extend_from_slice(header);
        assert!(OnionLayer::from_wire(&bytes).is_err());
    }

    #[test]
    fn payload_is_not_reencoded() {
        let layer = OnionLayer {
            next_ip: "127.0.0.1".parse().unwrap(),
            next_port: 9101,
            session_key: vec![42; 88],
            payload: vec![43; 1000],
        };
        let bytes = layer.to_wire().unwrap();
        assert!(bytes.ends_with(&layer.payload));
        assert!(bytes.len() < layer.payload.len() + 200);
    }

    #[test]
    fn nesting_grows_linearly() {
        let keys = generate_asymmetric_keypair();
        let addr = "127.0.0.1:9101".parse().unwrap();
        let mut layer = OnionLayer::new(&keys.pk, addr, &generate_symmetric_key(), &exit_hop()).unwrap();
        let mut previous = layer.to_wire().unwrap().len();
        for _ in 0..30 {
            let next_hop = NextHop::Relay { layer };
            layer = OnionLayer::new(&keys.pk, addr, &generate_symmetric_key(), &next_hop).unwrap();
            let len = layer.to_wire().unwrap().len();
            assert!(len - previous < 300);
            previous = len;
        }
    }
}
