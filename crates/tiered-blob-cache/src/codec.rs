//! Value codecs
//!
//! A codec turns a payload into the bytes written to disk and back. Decoding
//! may fail (corrupt or foreign file content); the engine treats that as a
//! cache miss, so `decode` returns an `Option` rather than an error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::warn;

/// Encodes cache payloads to bytes and back
pub trait Codec: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    fn encode(&self, value: &Self::Value) -> Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Option<Self::Value>;
}

/// UTF-8 string payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct StringCodec;

impl Codec for StringCodec {
    type Value = String;

    fn encode(&self, value: &String) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    fn decode(&self, bytes: &[u8]) -> Option<String> {
        String::from_utf8(bytes.to_vec()).ok()
    }
}

/// Raw binary payloads, stored as-is
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    type Value = Vec<u8>;

    fn encode(&self, value: &Vec<u8>) -> Vec<u8> {
        value.clone()
    }

    fn decode(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        Some(bytes.to_vec())
    }
}

/// JSON payloads for any serde-serializable type
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Value = T;

    fn encode(&self, value: &T) -> Vec<u8> {
        match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Empty bytes never decode, so the entry degrades to a miss
                warn!(error = %e, "Failed to encode value as JSON");
                Vec::new()
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Option<T> {
        serde_json::from_slice(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Observation {
        species: String,
        count: u32,
    }

    #[test]
    fn test_string_codec_roundtrip() {
        let codec = StringCodec;
        let bytes = codec.encode(&"hello world".to_string());
        assert_eq!(codec.decode(&bytes), Some("hello world".to_string()));
    }

    #[test]
    fn test_string_codec_rejects_invalid_utf8() {
        let codec = StringCodec;
        assert_eq!(codec.decode(&[0xff, 0xfe, 0xfd]), None);
    }

    #[test]
    fn test_bytes_codec_roundtrip() {
        let codec = BytesCodec;
        let data = vec![0u8, 1, 2, 255];
        let bytes = codec.encode(&data);
        assert_eq!(bytes, data);
        assert_eq!(codec.decode(&bytes), Some(data));
    }

    #[test]
    fn test_json_codec_roundtrip() {
        let codec = JsonCodec::<Observation>::new();
        let value = Observation {
            species: "Sturnus vulgaris".to_string(),
            count: 12,
        };

        let bytes = codec.encode(&value);
        assert_eq!(codec.decode(&bytes), Some(value));
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = JsonCodec::<Observation>::new();
        assert_eq!(codec.decode(b"not json at all"), None);
        assert_eq!(codec.decode(b""), None);
    }
}
