//! Cache Store Contract
//!
//! The six operations the caching behavior needs from a backend. Any store
//! offering atomic get/set/delete and atomic set-membership updates can
//! implement it.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// == Store Error ==
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Key or value rejected by the backend
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Store is full and nothing could be evicted
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// Backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Cache Store ==
/// Key/value store with expiry plus a tag index.
///
/// Tag operations are set-membership updates and must be atomic per call.
/// Nothing here is transactional across calls.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Returns the payload, or `None` when absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Stores or overwrites a payload.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()>;

    /// Removes a payload. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Keys currently indexed under `tag`. An unknown tag has no members.
    async fn tag_members(&self, tag: &str) -> StoreResult<HashSet<String>>;

    /// Indexes `key` under `tag`, creating the tag on first use.
    async fn add_to_tag(&self, tag: &str, key: &str) -> StoreResult<()>;

    /// Empties the tag's key set.
    async fn clear_tag(&self, tag: &str) -> StoreResult<()>;
}
