// rust/shardset-core/src/codec.rs

//! Byte encodings for values held in shard stores.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardsetError};

/// Error produced when stored bytes cannot be decoded.
pub type DecodeError = Box<dyn std::error::Error + Send + Sync>;

/// Encoding of record payloads and of the `length` metadata value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Compact binary encoding via `bincode`.
    #[default]
    Bincode,
    /// UTF-8 JSON via `serde_json`.
    Json,
}

impl Codec {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Bincode => bincode::serialize(value).map_err(|e| {
                ShardsetError::serialization(format!("bincode encode failed: {e}"))
            }),
            Codec::Json => serde_json::to_vec(value)
                .map_err(|e| ShardsetError::serialization(format!("json encode failed: {e}"))),
        }
    }

    /// Decodes `bytes`. The caller attaches location context to the error.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> std::result::Result<T, DecodeError> {
        match self {
            Codec::Bincode => Ok(bincode::deserialize(bytes)?),
            Codec::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Bincode => "bincode",
            Codec::Json => "json",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = ShardsetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bincode" => Ok(Codec::Bincode),
            "json" => Ok(Codec::Json),
            _ => Err(ShardsetError::config(format!(
                "unknown codec: '{s}'. Expected 'bincode' or 'json'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_value_bincode() {
        let bytes = Codec::Bincode.encode(&42u64).unwrap();
        assert_eq!(bytes, 42u64.to_le_bytes());
        let decoded: u64 = Codec::Bincode.decode(&bytes).unwrap();
        assert_eq!(decoded, 42);
    }

    #[test]
    fn test_length_value_json() {
        let bytes = Codec::Json.encode(&7u64).unwrap();
        assert_eq!(bytes, b"7");
        let decoded: u64 = Codec::Json.decode(b"7").unwrap();
        assert_eq!(decoded, 7);
    }

    #[test]
    fn test_decode_truncated_bincode() {
        let result: std::result::Result<u64, _> = Codec::Bincode.decode(&[1, 2, 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_garbage_json() {
        let result: std::result::Result<u64, _> = Codec::Json.decode(b"{not json");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_codec() {
        assert_eq!("bincode".parse::<Codec>().unwrap(), Codec::Bincode);
        assert_eq!("JSON".parse::<Codec>().unwrap(), Codec::Json);

        let err = "pickle".parse::<Codec>().unwrap_err();
        assert!(err.to_string().contains("unknown codec"));
    }
}
