//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the serializer framing and the memory store's tag index.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::cache::serializer::{MARKER_COMPRESSED, MARKER_UNCOMPRESSED};
use crate::cache::{BincodeCodec, CacheSerializer, CacheStore, JsonCodec, MemoryCacheStore};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    id: u64,
    title: String,
    tags: Vec<String>,
    done: bool,
}

// == Strategies ==
fn record_strategy() -> impl Strategy<Value = Record> {
    (
        any::<u64>(),
        "[a-zA-Z0-9 ]{0,512}",
        prop::collection::vec("[a-z]{1,12}", 0..8),
        any::<bool>(),
    )
        .prop_map(|(id, title, tags, done)| Record {
            id,
            title,
            tags,
            done,
        })
}

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}:[a-zA-Z0-9_]{1,32}"
}

#[derive(Debug, Clone)]
enum StoreOp {
    Set(String),
    Delete(String),
    ClearTag,
}

fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => key_strategy().prop_map(StoreOp::Set),
        1 => key_strategy().prop_map(StoreOp::Delete),
        1 => Just(StoreOp::ClearTag),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Serialize then deserialize gives the value back for both codecs,
    // with and without compression.
    #[test]
    fn prop_serializer_roundtrip(
        record in record_strategy(),
        use_compression in any::<bool>(),
        threshold in 0usize..2048
    ) {
        let json = CacheSerializer::new(JsonCodec);
        let framed = json.serialize(&record, use_compression, threshold).unwrap();
        let back: Option<Record> = json.deserialize_opt(&framed.bytes).unwrap();
        prop_assert_eq!(back, Some(record.clone()));

        let bin = CacheSerializer::new(BincodeCodec);
        let framed = bin.serialize(&record, use_compression, threshold).unwrap();
        let back: Option<Record> = bin.deserialize_opt(&framed.bytes).unwrap();
        prop_assert_eq!(back, Some(record));
    }

    // The marker is 0x01 exactly when compression is enabled and the encoded
    // payload reaches the threshold.
    #[test]
    fn prop_marker_follows_threshold(
        record in record_strategy(),
        use_compression in any::<bool>(),
        threshold in 0usize..2048
    ) {
        let serializer = CacheSerializer::new(JsonCodec);
        let framed = serializer.serialize(&record, use_compression, threshold).unwrap();

        let expect_compressed = use_compression && framed.original_size >= threshold;
        let expected_marker = if expect_compressed { MARKER_COMPRESSED } else { MARKER_UNCOMPRESSED };
        prop_assert_eq!(framed.bytes[0], expected_marker);
        prop_assert_eq!(framed.is_compressed, expect_compressed);
        prop_assert_eq!(framed.final_size, framed.bytes.len());
    }

    // After any sequence of writes, deletes and tag clears, every member of
    // the tag set is a stored key, and every stored key written with the tag
    // since the last clear is a member.
    #[test]
    fn prop_tag_index_tracks_entries(ops in prop::collection::vec(store_op_strategy(), 1..60)) {
        tokio_test::block_on(async {
            let store = MemoryCacheStore::new(TEST_MAX_ENTRIES);
            let mut tagged: HashSet<String> = HashSet::new();

            for op in ops {
                match op {
                    StoreOp::Set(key) => {
                        store.set(&key, vec![0], TEST_TTL).await.unwrap();
                        store.add_to_tag("all", &key).await.unwrap();
                        tagged.insert(key);
                    }
                    StoreOp::Delete(key) => {
                        store.delete(&key).await.unwrap();
                        tagged.remove(&key);
                    }
                    StoreOp::ClearTag => {
                        store.clear_tag("all").await.unwrap();
                        tagged.clear();
                    }
                }
            }

            let members = store.tag_members("all").await.unwrap();
            prop_assert_eq!(&members, &tagged);
            for key in &members {
                prop_assert!(store.contains_key(key).await, "tag references missing key {}", key);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    // Capacity is never exceeded and evicted keys leave the tag index.
    #[test]
    fn prop_capacity_enforced_with_tags(keys in prop::collection::vec(key_strategy(), 1..120)) {
        tokio_test::block_on(async {
            let max_entries = 16;
            let store = MemoryCacheStore::new(max_entries);

            for key in keys {
                store.set(&key, vec![1, 2, 3], TEST_TTL).await.unwrap();
                store.add_to_tag("all", &key).await.unwrap();
                prop_assert!(store.len().await <= max_entries);
            }

            let members = store.tag_members("all").await.unwrap();
            prop_assert_eq!(members.len(), store.len().await);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
