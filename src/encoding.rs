//! Serde helpers that carry raw bytes as base64 strings.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serializer};

/// `#[serde(with = "crate::encoding::base64_bytes")]` for a `Vec<u8>` field
pub mod base64_bytes {
    use super::*;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        String::deserialize(deserializer).and_then(|string| {
            BASE64
                .decode(string.as_bytes())
                .map_err(|err| Error::custom(err.to_string()))
        })
    }
}

/// `#[serde(with = "crate::encoding::base64_path")]` for a list of hashes
pub mod base64_path {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(hashes: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(hashes.len()))?;
        for hash in hashes {
            seq.serialize_element(&BASE64.encode(hash))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| BASE64.decode(s.as_bytes()).map_err(|err| Error::custom(err.to_string())))
            .collect()
    }
}

/// Encodes bytes as standard base64, for log lines and display
pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes standard base64
pub fn from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(s.trim())
}
