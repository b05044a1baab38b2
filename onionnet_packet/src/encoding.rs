//! Serde helpers for binary fields.

/// `Vec<u8>` as a standard base64 string.
pub(crate) mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes())
            .map_err(|e| de::Error::custom(format!("Can't decode base64 string: {}", e)))
    }
}

/// `PublicKey` as an upper case hex string.
pub(crate) mod hex_public_key {
    use hex::FromHex;
    use onionnet_crypto::PublicKey;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pk: &PublicKey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(pk.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PublicKey, D::Error> {
        let s = String::deserialize(deserializer)?;
        let pk_bytes: [u8; 32] = FromHex::from_hex(s)
            .map_err(|e| de::Error::custom(format!("Can't make bytes from hex string {:?}", e)))?;
        Ok(PublicKey::from(pk_bytes))
    }
}
