//! Memory Cache Store
//!
//! In-process [`CacheStore`] combining HashMap storage with LRU capacity
//! eviction, TTL expiration and a tag index.
//!
//! Besides the tag → keys index the store keeps the reverse key → tags map,
//! so a key that leaves the store (delete, expiry or eviction) is dropped
//! from every tag set it belongs to in the same critical section.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::store::{CacheStore, StoreError, StoreResult};
use crate::cache::{CacheEntry, CacheStats, LruTracker, MAX_KEY_LENGTH, MAX_VALUE_SIZE};

// == Memory State ==
#[derive(Debug)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    stats: CacheStats,
    /// tag -> keys indexed under it
    tags: HashMap<String, HashSet<String>>,
    /// key -> tags it is indexed under
    key_tags: HashMap<String, HashSet<String>>,
    max_entries: usize,
}

impl MemoryState {
    fn remove_key(&mut self, key: &str) -> bool {
        let existed = self.entries.remove(key).is_some();
        self.lru.remove(key);
        if let Some(tags) = self.key_tags.remove(key) {
            for tag in tags {
                if let Some(members) = self.tags.get_mut(&tag) {
                    members.remove(key);
                }
            }
        }
        existed
    }
}

// == Memory Cache Store ==
/// Shared handle to an in-memory cache. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryCacheStore {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` payloads.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                entries: HashMap::new(),
                lru: LruTracker::new(),
                stats: CacheStats::new(),
                tags: HashMap::new(),
                key_tags: HashMap::new(),
                max_entries: max_entries.max(1),
            })),
        }
    }

    // == Stats ==
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.read().await;
        let mut stats = state.stats.clone();
        stats.total_entries = state.entries.len();
        stats.total_tags = state.tags.len();
        stats
    }

    // == Cleanup Expired ==
    /// Removes expired entries and tag memberships of keys no longer stored.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove_key(key);
        }
        state.stats.record_expirations(expired.len());

        let dangling: Vec<String> = state
            .key_tags
            .keys()
            .filter(|key| !state.entries.contains_key(*key))
            .cloned()
            .collect();
        for key in &dangling {
            state.remove_key(key);
        }

        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// True when a live entry exists, without touching LRU order or stats.
    pub async fn contains_key(&self, key: &str) -> bool {
        let state = self.state.read().await;
        state
            .entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    // == Get ==
    /// Expired entries are removed on read and counted as misses.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        match state.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                state.stats.record_hit();
                state.lru.touch(key);
                Ok(Some(value))
            }
            Some(_) => {
                state.remove_key(key);
                state.stats.record_expirations(1);
                state.stats.record_miss();
                Ok(None)
            }
            None => {
                state.stats.record_miss();
                Ok(None)
            }
        }
    }

    // == Set ==
    /// Overwrites an existing entry and resets its TTL. A new key evicts the
    /// least recently used entry when the store is at capacity.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(StoreError::InvalidEntry(format!(
                "Key must be 1 to {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(StoreError::InvalidEntry(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }

        let mut state = self.state.write().await;

        let is_overwrite = state.entries.contains_key(key);
        if !is_overwrite && state.entries.len() >= state.max_entries {
            match state.lru.evict_oldest() {
                Some(evicted) => {
                    state.remove_key(&evicted);
                    state.stats.record_eviction();
                }
                None => {
                    return Err(StoreError::CacheFull(
                        "Cache is full and eviction failed".to_string(),
                    ))
                }
            }
        }

        state
            .entries
            .insert(key.to_string(), CacheEntry::new(value, ttl));
        state.lru.touch(key);
        Ok(())
    }

    // == Delete ==
    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.state.write().await.remove_key(key);
        Ok(())
    }

    // == Tag Index ==
    async fn tag_members(&self, tag: &str) -> StoreResult<HashSet<String>> {
        let state = self.state.read().await;
        Ok(state.tags.get(tag).cloned().unwrap_or_default())
    }

    async fn add_to_tag(&self, tag: &str, key: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .tags
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
        state
            .key_tags
            .entry(key.to_string())
            .or_default()
            .insert(tag.to_string());
        Ok(())
    }

    async fn clear_tag(&self, tag: &str) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let members: Vec<String> = match state.tags.get_mut(tag) {
            Some(members) => members.drain().collect(),
            None => return Ok(()),
        };
        for key in members {
            if let Some(tags) = state.key_tags.get_mut(&key) {
                tags.remove(tag);
                if tags.is_empty() {
                    state.key_tags.remove(&key);
                }
            }
        }
        Ok(())
    }
}
