//! Cache metadata carried by requests.

use std::time::Duration;

use crate::cache::{CacheKey, FeatureTag};

// == Cache Policy ==
/// Read-path metadata of a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub key: CacheKey,
    /// Zero falls back to the configured default ttl
    pub ttl: Duration,
    /// Entries stored under another version are read as a miss
    pub schema_version: u32,
    pub use_compression: bool,
    /// Extra tags besides the key's own feature tag
    pub tags: Vec<FeatureTag>,
}

impl CachePolicy {
    /// Policy with schema version 1, compression enabled and no extra tags.
    pub fn new(key: CacheKey, ttl: Duration) -> Self {
        Self {
            key,
            ttl,
            schema_version: 1,
            use_compression: true,
            tags: Vec::new(),
        }
    }

    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.use_compression = enabled;
        self
    }

    pub fn tag(mut self, tag: FeatureTag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Every tag the entry is indexed under, the key's feature tag first.
    pub fn all_tags(&self) -> Vec<FeatureTag> {
        let mut tags = vec![self.key.feature_tag()];
        for tag in &self.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags
    }
}

// == Cache Invalidation ==
/// Write-path metadata of a request that may change cached data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheInvalidation {
    pub exact_keys: Vec<CacheKey>,
    pub feature_tags: Vec<FeatureTag>,
}

impl CacheInvalidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: CacheKey) -> Self {
        self.exact_keys.push(key);
        self
    }

    pub fn tag(mut self, tag: FeatureTag) -> Self {
        self.feature_tags.push(tag);
        self
    }

    /// True when the write has no cache impact.
    pub fn is_empty(&self) -> bool {
        self.exact_keys.is_empty() && self.feature_tags.is_empty()
    }
}
