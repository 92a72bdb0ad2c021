// tests/property/consistency_test.rs

//! Property tests for spec.md §8 P1 (shard routing determinism), P3
//! (version monotonicity), P7 (consistent hash tag), and P10 (pool
//! bound).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use proptest::prelude::*;
use ridgekv::cluster::ConsistentHashRing;
use ridgekv::command::line::to_command_line;
use ridgekv::db::Database;
use ridgekv::error::Result;
use ridgekv::pool::{ConnectionFactory, ConnectionPool};
use ridgekv::storage::dict::ShardedDict;
use ridgekv::storage::time_wheel::TimeWheel;

proptest! {
    // P1: Get(k) after Put(k, v) returns v regardless of interleaved
    // operations on other keys.
    #[test]
    fn p1_shard_routing_is_deterministic_under_interleaved_writes(
        target in "[a-z]{1,8}",
        value in "[a-z]{1,8}",
        others in prop::collection::vec(("[a-z]{1,8}", "[a-z]{1,8}"), 0..50),
    ) {
        let dict: ShardedDict<Bytes> = ShardedDict::with_capacity(16);
        dict.put(Bytes::from(target.clone()), Bytes::from(value.clone()));
        for (k, v) in &others {
            if k != &target {
                dict.put(Bytes::from(k.clone()), Bytes::from(v.clone()));
            }
        }
        prop_assert_eq!(dict.get(target.as_bytes()), Some(Bytes::from(value)));
    }

    // P7: a hash tag forces co-location regardless of the rest of the key.
    #[test]
    fn p7_hash_tag_pins_routing(tag in "[a-zA-Z0-9]{1,12}", prefix_a in "[a-z]{0,6}", prefix_b in "[a-z]{0,6}") {
        let mut ring = ConsistentHashRing::new(8);
        ring.add_node(&["node-1".to_string(), "node-2".to_string(), "node-3".to_string()]);
        let key_a = format!("{prefix_a}{{{tag}}}1");
        let key_b = format!("{prefix_b}{{{tag}}}2");
        let bare_tag = tag.clone();
        prop_assert_eq!(ring.pick_node(key_a.as_bytes()), ring.pick_node(key_b.as_bytes()));
        prop_assert_eq!(ring.pick_node(key_a.as_bytes()), ring.pick_node(bare_tag.as_bytes()));
    }
}

#[tokio::test]
async fn p3_successful_write_increments_every_touched_key_version_by_exactly_one() {
    let db = Database::new(0, TimeWheel::new(), None);
    db.exec_normal(&to_command_line(&["SET", "a", "1"])).await;
    db.exec_normal(&to_command_line(&["SET", "b", "1"])).await;
    let (va0, vb0) = (db.current_version(b"a"), db.current_version(b"b"));

    // MSET touches both keys in one write.
    db.exec_normal(&to_command_line(&["MSET", "a", "2", "b", "2"])).await;

    assert_eq!(db.current_version(b"a"), va0 + 1);
    assert_eq!(db.current_version(b"b"), vb0 + 1);
}

struct CountingFactory {
    created: AtomicUsize,
}

#[async_trait]
impl ConnectionFactory<usize> for CountingFactory {
    async fn create(&self) -> Result<usize> {
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }
}

#[tokio::test]
async fn p10_pool_never_hands_out_more_than_max_active_concurrently() {
    const MAX_ACTIVE: usize = 3;
    let factory = Arc::new(CountingFactory { created: AtomicUsize::new(0) });
    let pool = Arc::new(ConnectionPool::new(factory, MAX_ACTIVE, MAX_ACTIVE));

    let mut held = Vec::new();
    for _ in 0..MAX_ACTIVE {
        held.push(pool.get().await.unwrap());
    }
    assert_eq!(pool.active_count(), MAX_ACTIVE);

    // A further Get must block until a Put frees a slot.
    let pool2 = pool.clone();
    let waiter = tokio::spawn(async move { pool2.get().await.unwrap() });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    let freed = held.pop().unwrap();
    pool.put(freed);

    let got = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
        .await
        .expect("waiter should be woken by the Put")
        .unwrap();
    held.push(got);
    assert_eq!(pool.active_count(), MAX_ACTIVE);
}
