//! Cache Serializer Module
//!
//! Turns values into cache payloads and back. Every payload is framed as
//!
//! ```text
//! +--------+---------------------------+
//! | marker | encoded payload           |
//! | 1 byte | codec output, maybe LZ4   |
//! +--------+---------------------------+
//! ```
//!
//! where the marker is [`MARKER_UNCOMPRESSED`] or [`MARKER_COMPRESSED`].
//! Compressed payloads use the LZ4 block format with the uncompressed size
//! prepended. The framing does not depend on the codec, so codecs can be
//! swapped without touching the caching behavior.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

// == Public Constants ==
pub const MARKER_UNCOMPRESSED: u8 = 0x00;
pub const MARKER_COMPRESSED: u8 = 0x01;

// == Serializer Error ==
#[derive(Error, Debug)]
pub enum SerializerError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Decompression error: {0}")]
    Decompress(String),

    #[error("Unknown compression marker: {0:#04x}")]
    UnknownMarker(u8),
}

pub type Result<T> = std::result::Result<T, SerializerError>;

// == Codec ==
/// Encodes values to bytes. Implementations know nothing about framing.
pub trait Codec: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Text codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| SerializerError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| SerializerError::Decode(e.to_string()))
    }
}

/// Compact binary codec backed by `bincode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| SerializerError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| SerializerError::Decode(e.to_string()))
    }
}

// == Serialization Result ==
/// A framed payload plus sizes for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationResult {
    /// Marker byte followed by the (maybe compressed) payload
    pub bytes: Vec<u8>,
    /// Encoded size before compression, without the marker
    pub original_size: usize,
    /// Size of `bytes`
    pub final_size: usize,
    pub is_compressed: bool,
}

// == Cache Serializer ==
/// Applies the marker framing and optional compression around a [`Codec`].
#[derive(Debug, Clone, Default)]
pub struct CacheSerializer<C: Codec> {
    codec: C,
}

impl<C: Codec> CacheSerializer<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    // == Serialize ==
    /// Encodes `value` and frames it.
    ///
    /// The payload is compressed only when `use_compression` is set and the
    /// encoded length is at least `compression_threshold`.
    pub fn serialize<T: Serialize>(
        &self,
        value: &T,
        use_compression: bool,
        compression_threshold: usize,
    ) -> Result<SerializationResult> {
        let encoded = self.codec.encode(value)?;
        let original_size = encoded.len();

        let compress = use_compression && original_size >= compression_threshold;
        let mut bytes;
        if compress {
            let compressed = lz4_flex::compress_prepend_size(&encoded);
            bytes = Vec::with_capacity(compressed.len() + 1);
            bytes.push(MARKER_COMPRESSED);
            bytes.extend_from_slice(&compressed);
        } else {
            bytes = Vec::with_capacity(original_size + 1);
            bytes.push(MARKER_UNCOMPRESSED);
            bytes.extend_from_slice(&encoded);
        }

        Ok(SerializationResult {
            final_size: bytes.len(),
            bytes,
            original_size,
            is_compressed: compress,
        })
    }

    // == Deserialize ==
    /// Decodes a framed payload. Empty input yields `T::default()`.
    pub fn deserialize<T: DeserializeOwned + Default>(&self, bytes: &[u8]) -> Result<T> {
        Ok(self.deserialize_opt(bytes)?.unwrap_or_default())
    }

    /// Decodes a framed payload, returning `None` for empty input.
    pub fn deserialize_opt<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Option<T>> {
        let Some((&marker, payload)) = bytes.split_first() else {
            return Ok(None);
        };

        match marker {
            MARKER_UNCOMPRESSED => self.codec.decode(payload).map(Some),
            MARKER_COMPRESSED => {
                let decompressed = lz4_flex::decompress_size_prepended(payload)
                    .map_err(|e| SerializerError::Decompress(e.to_string()))?;
                self.codec.decode(&decompressed).map(Some)
            }
            other => Err(SerializerError::UnknownMarker(other)),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: u32,
        title: String,
        done: bool,
    }

    fn sample(title_len: usize) -> Sample {
        Sample {
            id: 7,
            title: "x".repeat(title_len),
            done: true,
        }
    }

    #[test]
    fn test_uncompressed_marker_below_threshold() {
        let serializer = CacheSerializer::new(JsonCodec);
        let result = serializer.serialize(&sample(4), true, 1024).unwrap();

        assert_eq!(result.bytes[0], MARKER_UNCOMPRESSED);
        assert!(!result.is_compressed);
        assert_eq!(result.final_size, result.original_size + 1);
        assert_eq!(&result.bytes[1..], serde_json::to_vec(&sample(4)).unwrap());
    }

    #[test]
    fn test_compressed_marker_at_threshold() {
        let serializer = CacheSerializer::new(JsonCodec);
        let encoded_len = serde_json::to_vec(&sample(2000)).unwrap().len();

        let result = serializer.serialize(&sample(2000), true, encoded_len).unwrap();
        assert_eq!(result.bytes[0], MARKER_COMPRESSED);
        assert!(result.is_compressed);
        assert!(result.final_size < result.original_size);

        let below = serializer
            .serialize(&sample(2000), true, encoded_len + 1)
            .unwrap();
        assert_eq!(below.bytes[0], MARKER_UNCOMPRESSED);
    }

    #[test]
    fn test_compression_disabled() {
        let serializer = CacheSerializer::new(BincodeCodec);
        let result = serializer.serialize(&sample(4096), false, 0).unwrap();
        assert_eq!(result.bytes[0], MARKER_UNCOMPRESSED);
        assert!(!result.is_compressed);
    }

    #[test]
    fn test_roundtrip_both_codecs() {
        let json = CacheSerializer::new(JsonCodec);
        let bin = CacheSerializer::new(BincodeCodec);

        for compress in [true, false] {
            let framed = json.serialize(&sample(3000), compress, 16).unwrap();
            let back: Sample = json.deserialize(&framed.bytes).unwrap();
            assert_eq!(back, sample(3000));

            let framed = bin.serialize(&sample(3000), compress, 16).unwrap();
            let back: Sample = bin.deserialize(&framed.bytes).unwrap();
            assert_eq!(back, sample(3000));
        }
    }

    #[test]
    fn test_empty_input_yields_default() {
        let serializer = CacheSerializer::new(JsonCodec);
        let value: Sample = serializer.deserialize(&[]).unwrap();
        assert_eq!(value, Sample::default());

        let value: Option<Sample> = serializer.deserialize_opt(&[]).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_unknown_marker() {
        let serializer = CacheSerializer::new(JsonCodec);
        let result: Result<Sample> = serializer.deserialize(&[0x07, b'{', b'}']);
        assert!(matches!(result, Err(SerializerError::UnknownMarker(0x07))));
    }

    #[test]
    fn test_corrupt_compressed_payload() {
        let serializer = CacheSerializer::new(JsonCodec);
        let result: Result<Sample> = serializer.deserialize(&[MARKER_COMPRESSED, 0xff]);
        assert!(matches!(result, Err(SerializerError::Decompress(_))));
    }
}
