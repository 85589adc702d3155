//! Cache Module
//!
//! Cache keys and tags, the cache metadata requests carry, the payload
//! serializer and the cache store contract with its in-memory backend.

mod entry;
mod key;
mod lru;
mod memory;
mod policy;
pub mod serializer;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::CacheEntry;
pub use key::{CacheKey, FeatureTag};
pub use lru::LruTracker;
pub use memory::MemoryCacheStore;
pub use policy::{CacheInvalidation, CachePolicy};
pub use serializer::{
    BincodeCodec, CacheSerializer, Codec, JsonCodec, SerializationResult, SerializerError,
};
pub use stats::CacheStats;
pub use store::{CacheStore, StoreError, StoreResult};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
