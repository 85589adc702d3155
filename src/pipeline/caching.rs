//! Caching Behavior
//!
//! Cache-aside around the handler:
//!
//! - a request with a [`CacheInvalidation`] runs the handler and, only if it
//!   succeeded, deletes the exact keys and drains the feature tags; this path
//!   wins when a request also declares a [`CachePolicy`]
//! - a request with a [`CachePolicy`] is served from the store when a live
//!   entry with the same schema version exists, otherwise the handler runs
//!   and a successful response is stored and indexed under its tags
//! - anything else passes through
//!
//! Store failures on the read path degrade to a miss. Store failures while
//! invalidating are logged under the `cache_invalidation_alert` target and
//! counted, but never change the outcome of the write.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Span};

use crate::cache::{
    CacheInvalidation, CachePolicy, CacheSerializer, CacheStore, Codec, FeatureTag, StoreError,
    StoreResult,
};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::pipeline::behavior::{Behavior, Next};
use crate::pipeline::metrics::PipelineMetrics;
use crate::pipeline::request::Request;

/// Log target for failed invalidations after a successful write.
pub const INVALIDATION_ALERT_TARGET: &str = "cache_invalidation_alert";

/// What is actually stored: the response tagged with its schema version.
#[derive(Serialize, Deserialize)]
struct CachedEnvelope<T> {
    schema_version: u32,
    value: T,
}

// == Cache Settings ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Encoded payloads at or above this size are compressed when the policy allows it
    pub compression_threshold: usize,
    /// Used for policies declaring a zero ttl
    pub default_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            compression_threshold: 1024,
            default_ttl: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for CacheSettings {
    fn from(config: &Config) -> Self {
        Self {
            compression_threshold: config.compression_threshold,
            default_ttl: Duration::from_secs(config.default_ttl),
        }
    }
}

pub struct CachingBehavior<C: Codec> {
    store: Arc<dyn CacheStore>,
    serializer: CacheSerializer<C>,
    settings: CacheSettings,
    metrics: Arc<PipelineMetrics>,
}

impl<C: Codec> CachingBehavior<C> {
    pub fn new(
        store: Arc<dyn CacheStore>,
        serializer: CacheSerializer<C>,
        settings: CacheSettings,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            serializer,
            settings,
            metrics,
        }
    }

    pub fn codec_name(&self) -> &'static str {
        self.serializer.codec_name()
    }

    // == Read Path ==
    async fn read<R: Request>(&self, policy: &CachePolicy) -> Option<R::Response> {
        let bytes = match self.store.get(policy.key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(request = R::NAME, key = %policy.key, error = %err, "Cache read failed, treating as miss");
                self.metrics.record_cache_error();
                return None;
            }
        };

        match self
            .serializer
            .deserialize_opt::<CachedEnvelope<R::Response>>(&bytes)
        {
            Ok(Some(envelope)) if envelope.schema_version == policy.schema_version => {
                Some(envelope.value)
            }
            Ok(Some(envelope)) => {
                debug!(
                    key = %policy.key,
                    stored = envelope.schema_version,
                    expected = policy.schema_version,
                    "Cached entry has another schema version"
                );
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(request = R::NAME, key = %policy.key, error = %err, "Cached entry could not be decoded, treating as miss");
                self.metrics.record_cache_error();
                None
            }
        }
    }

    async fn write<R: Request>(&self, policy: &CachePolicy, value: &R::Response) {
        let envelope = CachedEnvelope {
            schema_version: policy.schema_version,
            value,
        };
        let framed = match self.serializer.serialize(
            &envelope,
            policy.use_compression,
            self.settings.compression_threshold,
        ) {
            Ok(framed) => framed,
            Err(err) => {
                warn!(request = R::NAME, key = %policy.key, error = %err, "Response could not be encoded, not cached");
                self.metrics.record_cache_error();
                return;
            }
        };

        Span::current().record("compressed", framed.is_compressed);
        let is_compressed = framed.is_compressed;
        let (original_size, final_size) = (framed.original_size, framed.final_size);

        let ttl = if policy.ttl.is_zero() {
            self.settings.default_ttl
        } else {
            policy.ttl
        };
        let key = policy.key.as_str();
        if let Err(err) = self.store.set(key, framed.bytes, ttl).await {
            warn!(request = R::NAME, key, error = %err, "Cache write failed");
            self.metrics.record_cache_error();
            return;
        }
        // An entry missing from any of its tags could never be invalidated by
        // that tag, so it is dropped instead.
        for tag in policy.all_tags() {
            if let Err(err) = self.store.add_to_tag(tag.as_str(), key).await {
                warn!(request = R::NAME, key, tag = %tag, error = %err, "Tag index update failed, dropping entry");
                self.metrics.record_cache_error();
                if let Err(err) = self.store.delete(key).await {
                    error!(
                        target: INVALIDATION_ALERT_TARGET,
                        request = R::NAME,
                        key,
                        error = %err,
                        "Untagged cache entry could not be removed, stale reads possible"
                    );
                }
                return;
            }
        }

        self.metrics.record_cache_write(is_compressed);
        debug!(
            key,
            codec = self.serializer.codec_name(),
            ttl_secs = ttl.as_secs(),
            original_size,
            final_size,
            compressed = is_compressed,
            "Response cached"
        );
    }

    // == Write Path ==
    async fn invalidate<R: Request>(&self, invalidation: &CacheInvalidation) {
        let mut failures = 0u64;

        for key in &invalidation.exact_keys {
            if let Err(err) = self.store.delete(key.as_str()).await {
                failures += 1;
                error!(
                    target: INVALIDATION_ALERT_TARGET,
                    request = R::NAME,
                    key = %key,
                    error = %err,
                    "Cache key invalidation failed, stale reads possible"
                );
            }
        }

        for tag in &invalidation.feature_tags {
            match self.invalidate_tag(tag).await {
                Ok(removed) => debug!(request = R::NAME, tag = %tag, removed, "Feature tag invalidated"),
                Err(err) => {
                    failures += 1;
                    error!(
                        target: INVALIDATION_ALERT_TARGET,
                        request = R::NAME,
                        tag = %tag,
                        error = %err,
                        "Feature tag invalidation failed, stale reads possible"
                    );
                }
            }
        }

        self.metrics.record_invalidation(failures);
    }

    /// Deletes every key indexed under `tag`, then empties the tag.
    ///
    /// The tag is only cleared when every delete succeeded, so a failed
    /// member is still indexed for the next invalidation. A key added to the
    /// tag between the member fetch and the clear loses its membership and
    /// may be served stale until it expires.
    async fn invalidate_tag(&self, tag: &FeatureTag) -> StoreResult<usize> {
        let members = self.store.tag_members(tag.as_str()).await?;

        let mut first_error: Option<StoreError> = None;
        for key in &members {
            if let Err(err) = self.store.delete(key).await {
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        self.store.clear_tag(tag.as_str()).await?;
        Ok(members.len())
    }
}

#[async_trait]
impl<R: Request, C: Codec> Behavior<R> for CachingBehavior<C> {
    async fn handle(
        &self,
        request: R,
        token: CancellationToken,
        next: Next<R>,
    ) -> AppResult<R::Response> {
        let span = Span::current();

        if let Some(invalidation) = request.invalidation() {
            if request.cache_policy().is_some() {
                debug!(request = R::NAME, "Request is cacheable and invalidating, treating as write");
            }
            span.record("cache", "invalidate");

            let result = next.run(request, token).await;
            // The write already happened, so invalidate even if cancelled since.
            if result.is_ok() && !invalidation.is_empty() {
                self.invalidate::<R>(&invalidation).await;
            }
            return result;
        }

        let Some(policy) = request.cache_policy() else {
            span.record("cache", "bypass");
            return next.run(request, token).await;
        };

        if token.is_cancelled() {
            return Err(AppError::cancelled());
        }

        if let Some(value) = self.read::<R>(&policy).await {
            span.record("cache", "hit");
            self.metrics.record_cache_hit();
            debug!(request = R::NAME, key = %policy.key, "Cache hit");
            return Ok(value);
        }

        span.record("cache", "miss");
        self.metrics.record_cache_miss();
        debug!(request = R::NAME, key = %policy.key, "Cache miss");

        let result = next.run(request, token.clone()).await;

        if token.is_cancelled() {
            debug!(request = R::NAME, key = %policy.key, "Request cancelled, response not cached");
            return match result {
                Err(err) => Err(err),
                Ok(_) => Err(AppError::cancelled()),
            };
        }

        if let Ok(value) = &result {
            self.write::<R>(&policy, value).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::cache::serializer::{MARKER_COMPRESSED, MARKER_UNCOMPRESSED};
    use crate::cache::{CacheKey, JsonCodec, MemoryCacheStore};
    use crate::error::ErrorKind;
    use crate::pipeline::behavior::compose;
    use crate::pipeline::request::{Handler, RequestKind};

    const TTL: Duration = Duration::from_secs(60);

    // == Test Requests ==
    #[derive(Clone)]
    struct Lookup {
        id: u32,
        version: u32,
        compress: bool,
    }

    impl Lookup {
        fn new(id: u32) -> Self {
            Self {
                id,
                version: 1,
                compress: false,
            }
        }
    }

    impl Request for Lookup {
        type Response = String;
        const NAME: &'static str = "Lookup";
        const KIND: RequestKind = RequestKind::Query;

        fn cache_policy(&self) -> Option<CachePolicy> {
            Some(
                CachePolicy::new(CacheKey::of("items", self.id), TTL)
                    .schema_version(self.version)
                    .compression(self.compress),
            )
        }
    }

    #[derive(Clone)]
    struct Touch {
        keys: Vec<CacheKey>,
        tags: Vec<FeatureTag>,
        also_cacheable: bool,
    }

    impl Request for Touch {
        type Response = String;
        const NAME: &'static str = "Touch";
        const KIND: RequestKind = RequestKind::Command;

        fn cache_policy(&self) -> Option<CachePolicy> {
            self.also_cacheable
                .then(|| CachePolicy::new(CacheKey::of("items", "touch"), TTL))
        }

        fn invalidation(&self) -> Option<CacheInvalidation> {
            Some(CacheInvalidation {
                exact_keys: self.keys.clone(),
                feature_tags: self.tags.clone(),
            })
        }
    }

    struct Plain;

    impl Request for Plain {
        type Response = String;
        const NAME: &'static str = "Plain";
        const KIND: RequestKind = RequestKind::Query;
    }

    // == Test Handler ==
    #[derive(Clone, Default)]
    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
        payload_len: usize,
    }

    impl Counting {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn outcome(&self, label: String) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(AppError::not_found("Items.NotFound", "missing"))
            } else {
                Ok(format!("{}{}", label, "x".repeat(self.payload_len)))
            }
        }
    }

    #[async_trait]
    impl Handler<Lookup> for Counting {
        async fn handle(&self, request: Lookup, _token: &CancellationToken) -> AppResult<String> {
            self.outcome(format!("item-{}-call-{}", request.id, self.calls()))
        }
    }

    #[async_trait]
    impl Handler<Touch> for Counting {
        async fn handle(&self, _request: Touch, _token: &CancellationToken) -> AppResult<String> {
            self.outcome("touched".to_string())
        }
    }

    #[async_trait]
    impl Handler<Plain> for Counting {
        async fn handle(&self, _request: Plain, _token: &CancellationToken) -> AppResult<String> {
            self.outcome("plain".to_string())
        }
    }

    // == Failing Store ==
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn tag_members(&self, _tag: &str) -> StoreResult<HashSet<String>> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn add_to_tag(&self, _tag: &str, _key: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn clear_tag(&self, _tag: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    /// Memory store whose tag index always fails.
    struct UntaggableStore(MemoryCacheStore);

    #[async_trait]
    impl CacheStore for UntaggableStore {
        async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StoreResult<()> {
            self.0.set(key, value, ttl).await
        }
        async fn delete(&self, key: &str) -> StoreResult<()> {
            self.0.delete(key).await
        }
        async fn tag_members(&self, tag: &str) -> StoreResult<HashSet<String>> {
            self.0.tag_members(tag).await
        }
        async fn add_to_tag(&self, _tag: &str, _key: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("tag index down".to_string()))
        }
        async fn clear_tag(&self, tag: &str) -> StoreResult<()> {
            self.0.clear_tag(tag).await
        }
    }

    // == Helpers ==
    struct Fixture {
        store: Arc<dyn CacheStore>,
        memory: Option<MemoryCacheStore>,
        metrics: Arc<PipelineMetrics>,
        handler: Counting,
    }

    impl Fixture {
        fn memory() -> Self {
            let memory = MemoryCacheStore::new(100);
            Self {
                store: Arc::new(memory.clone()),
                memory: Some(memory),
                metrics: Arc::new(PipelineMetrics::new()),
                handler: Counting::default(),
            }
        }

        fn untaggable() -> Self {
            let memory = MemoryCacheStore::new(100);
            Self {
                store: Arc::new(UntaggableStore(memory.clone())),
                memory: Some(memory),
                metrics: Arc::new(PipelineMetrics::new()),
                handler: Counting::default(),
            }
        }

        fn broken() -> Self {
            Self {
                store: Arc::new(BrokenStore),
                memory: None,
                metrics: Arc::new(PipelineMetrics::new()),
                handler: Counting::default(),
            }
        }

        fn pipeline<R: Request>(&self) -> Next<R>
        where
            Counting: Handler<R>,
        {
            let settings = CacheSettings {
                compression_threshold: 64,
                default_ttl: TTL,
            };
            let caching: Arc<dyn Behavior<R>> = Arc::new(CachingBehavior::new(
                Arc::clone(&self.store),
                CacheSerializer::new(JsonCodec),
                settings,
                Arc::clone(&self.metrics),
            ));
            compose::<R>(Arc::new(self.handler.clone()), vec![caching])
        }

        async fn send<R: Request>(&self, request: R) -> AppResult<R::Response>
        where
            Counting: Handler<R>,
        {
            self.pipeline::<R>()
                .run(request, CancellationToken::new())
                .await
        }

        fn memory_store(&self) -> &MemoryCacheStore {
            self.memory.as_ref().unwrap()
        }
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let fx = Fixture::memory();

        let first = fx.send(Lookup::new(1)).await.unwrap();
        let second = fx.send(Lookup::new(1)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fx.handler.calls(), 1);
        let snapshot = fx.metrics.snapshot();
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_writes, 1);
    }

    #[tokio::test]
    async fn test_entry_indexed_under_feature_tag() {
        let fx = Fixture::memory();
        fx.send(Lookup::new(1)).await.unwrap();

        let members = fx.memory_store().tag_members("items").await.unwrap();
        assert!(members.contains("items:1"));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let fx = Fixture::memory();
        fx.handler.fail.store(true, Ordering::SeqCst);

        let err = fx.send(Lookup::new(1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(fx.memory_store().is_empty().await);

        fx.handler.fail.store(false, Ordering::SeqCst);
        fx.send(Lookup::new(1)).await.unwrap();
        assert_eq!(fx.handler.calls(), 2);
    }

    #[tokio::test]
    async fn test_schema_version_mismatch_is_miss() {
        let fx = Fixture::memory();
        fx.send(Lookup::new(1)).await.unwrap();

        let mut bumped = Lookup::new(1);
        bumped.version = 2;
        fx.send(bumped.clone()).await.unwrap();
        assert_eq!(fx.handler.calls(), 2);

        // The rewritten entry now carries version 2
        fx.send(bumped).await.unwrap();
        assert_eq!(fx.handler.calls(), 2);
    }

    #[tokio::test]
    async fn test_compression_marker_follows_policy() {
        let mut fx = Fixture::memory();
        fx.handler.payload_len = 512;

        let mut compressed = Lookup::new(1);
        compressed.compress = true;
        fx.send(compressed).await.unwrap();
        fx.send(Lookup::new(2)).await.unwrap();

        let stored = fx.memory_store().get("items:1").await.unwrap().unwrap();
        assert_eq!(stored[0], MARKER_COMPRESSED);
        let stored = fx.memory_store().get("items:2").await.unwrap().unwrap();
        assert_eq!(stored[0], MARKER_UNCOMPRESSED);

        assert_eq!(fx.metrics.snapshot().compressed_writes, 1);
    }

    #[tokio::test]
    async fn test_tag_invalidation_forces_miss() {
        let fx = Fixture::memory();
        fx.send(Lookup::new(1)).await.unwrap();
        fx.send(Lookup::new(2)).await.unwrap();

        fx.send(Touch {
            keys: Vec::new(),
            tags: vec![FeatureTag::of("items")],
            also_cacheable: false,
        })
        .await
        .unwrap();

        assert!(fx.memory_store().is_empty().await);
        assert!(fx
            .memory_store()
            .tag_members("items")
            .await
            .unwrap()
            .is_empty());

        fx.send(Lookup::new(1)).await.unwrap();
        // two reads, one write, one read after invalidation
        assert_eq!(fx.handler.calls(), 4);
    }

    #[tokio::test]
    async fn test_exact_key_invalidation() {
        let fx = Fixture::memory();
        fx.send(Lookup::new(1)).await.unwrap();
        fx.send(Lookup::new(2)).await.unwrap();

        fx.send(Touch {
            keys: vec![CacheKey::of("items", 1)],
            tags: Vec::new(),
            also_cacheable: false,
        })
        .await
        .unwrap();

        assert!(!fx.memory_store().contains_key("items:1").await);
        assert!(fx.memory_store().contains_key("items:2").await);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_invalidate() {
        let fx = Fixture::memory();
        fx.send(Lookup::new(1)).await.unwrap();

        fx.handler.fail.store(true, Ordering::SeqCst);
        let result = fx
            .send(Touch {
                keys: vec![CacheKey::of("items", 1)],
                tags: vec![FeatureTag::of("items")],
                also_cacheable: false,
            })
            .await;
        assert!(result.is_err());
        assert!(fx.memory_store().contains_key("items:1").await);
        assert_eq!(fx.metrics.snapshot().invalidations, 0);
    }

    #[tokio::test]
    async fn test_invalidation_wins_over_cache_policy() {
        let fx = Fixture::memory();
        fx.send(Lookup::new(1)).await.unwrap();

        let touch = Touch {
            keys: Vec::new(),
            tags: vec![FeatureTag::of("items")],
            also_cacheable: true,
        };
        fx.send(touch.clone()).await.unwrap();
        fx.send(touch).await.unwrap();

        // Both writes reached the handler and nothing was cached for them
        assert_eq!(fx.handler.calls(), 3);
        assert!(!fx.memory_store().contains_key("items:touch").await);
        assert!(!fx.memory_store().contains_key("items:1").await);
        assert_eq!(fx.metrics.snapshot().cache_hits, 0);
    }

    #[tokio::test]
    async fn test_pass_through_without_metadata() {
        let fx = Fixture::memory();
        fx.send(Plain).await.unwrap();
        fx.send(Plain).await.unwrap();

        assert_eq!(fx.handler.calls(), 2);
        assert!(fx.memory_store().is_empty().await);
    }

    #[tokio::test]
    async fn test_store_failure_on_read_degrades_to_miss() {
        let fx = Fixture::broken();

        let first = fx.send(Lookup::new(1)).await;
        let second = fx.send(Lookup::new(1)).await;

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(fx.handler.calls(), 2);
        assert!(fx.metrics.snapshot().cache_errors >= 2);
    }

    #[tokio::test]
    async fn test_entry_dropped_when_tag_index_fails() {
        let fx = Fixture::untaggable();

        fx.send(Lookup::new(1)).await.unwrap();
        assert!(!fx.memory_store().contains_key("items:1").await);

        fx.send(Touch {
            keys: Vec::new(),
            tags: vec![FeatureTag::of("items")],
            also_cacheable: false,
        })
        .await
        .unwrap();

        // read, write, then a fresh read instead of a stale hit
        let after = fx.send(Lookup::new(1)).await.unwrap();
        assert_eq!(after, "item-1-call-2");
        assert_eq!(fx.handler.calls(), 3);

        let snapshot = fx.metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.cache_writes, 0);
        assert!(snapshot.cache_errors >= 2);
    }

    #[tokio::test]
    async fn test_store_failure_on_invalidation_keeps_success() {
        let fx = Fixture::broken();

        let result = fx
            .send(Touch {
                keys: vec![CacheKey::of("items", 1)],
                tags: vec![FeatureTag::of("items")],
                also_cacheable: false,
            })
            .await;

        assert_eq!(result.unwrap(), "touched");
        let snapshot = fx.metrics.snapshot();
        assert_eq!(snapshot.invalidations, 1);
        assert_eq!(snapshot.invalidation_failures, 2);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let fx = Fixture::memory();
        fx.memory_store()
            .set("items:1", vec![0x09, 0x01], TTL)
            .await
            .unwrap();

        fx.send(Lookup::new(1)).await.unwrap();
        assert_eq!(fx.handler.calls(), 1);

        // Overwritten with a readable entry
        fx.send(Lookup::new(1)).await.unwrap();
        assert_eq!(fx.handler.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_read_does_not_populate_cache() {
        let fx = Fixture::memory();
        let token = CancellationToken::new();
        token.cancel();

        let err = fx
            .pipeline::<Lookup>()
            .run(Lookup::new(1), token)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(fx.handler.calls(), 0);
        assert!(fx.memory_store().is_empty().await);
    }
}
