//! Serde adapters for byte fields in the persisted representation.
//!
//! Key material is written as standard base64 strings. Missing and empty
//! fields decode to the same empty value.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
use zeroize::Zeroizing;

/// Base64 encoding for public byte fields.
pub(crate) mod base64_bytes {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

/// Base64 encoding for private key material.
///
/// The intermediate string is zeroized once decoded.
pub(crate) mod base64_secret {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(
        bytes: &Zeroizing<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = Zeroizing::new(STANDARD.encode(bytes.as_slice()));
        serializer.serialize_str(&encoded)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Zeroizing<Vec<u8>>, D::Error> {
        let encoded = Zeroizing::new(Option::<String>::deserialize(deserializer)?.unwrap_or_default());
        STANDARD.decode(encoded.as_bytes()).map(Zeroizing::new).map_err(D::Error::custom)
    }

    pub(crate) fn is_empty(bytes: &Zeroizing<Vec<u8>>) -> bool {
        bytes.is_empty()
    }
}
