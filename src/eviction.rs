//! C8: approximate LRU/LFU eviction, triggered by a background loop
//! comparing estimated resident memory against `maxmemory` (spec.md
//! §4.8). Grounded on `spineldb`'s `Db::evict_one_key`
//! (`src/core/database/eviction.rs`) for the per-round sampling
//! strategy and `EvictionManager::run` (`src/core/tasks/eviction.rs`)
//! for the background-loop shape, adapted from per-shard sampling to
//! this crate's per-database `sample_candidates`/`recency_of` API.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::EvictionPolicy;
use crate::db::Database;

/// `keyNumsOneRound`: candidates sampled per DB per eviction attempt.
const KEY_SAMPLE_SIZE: usize = 5;
/// `dbNumsOneRound`: DBs sampled per round.
const DB_SAMPLE_SIZE: usize = 4;
/// Bounds the inner loop so an undersized `maxmemory` can't livelock the
/// eviction task (spec.md §4.8).
const MAX_ROUND_ITERATIONS: usize = 64;

pub struct EvictionEngine {
    dbs: Arc<[Database]>,
    policy: EvictionPolicy,
    maxmemory: u64,
}

impl EvictionEngine {
    pub fn new(dbs: Arc<[Database]>, policy: EvictionPolicy, maxmemory: u64) -> Self {
        Self { dbs, policy, maxmemory }
    }

    fn estimated_memory(&self) -> u64 {
        self.dbs.iter().map(|db| db.approx_memory() as u64).sum()
    }

    /// Drives the eviction loop until `shutdown` fires. A no-op if
    /// eviction isn't configured, matching the teacher's early return
    /// rather than spinning a dead interval.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.maxmemory == 0 || self.policy == EvictionPolicy::NoEviction {
            debug!("eviction engine idle: maxmemory unset or policy is noeviction");
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            tokio::select! {
                _ = interval.tick() => self.round().await,
                _ = shutdown.recv() => return,
            }
        }
    }

    /// One round: while memory is over the watermark, sample up to
    /// `DB_SAMPLE_SIZE` DBs at random and evict one key from each in
    /// parallel, barrier-joining before deciding whether to continue.
    async fn round(&self) {
        for _ in 0..MAX_ROUND_ITERATIONS {
            if self.estimated_memory() <= self.maxmemory {
                return;
            }

            let mut indices: Vec<usize> = (0..self.dbs.len()).collect();
            indices.shuffle(&mut rand::thread_rng());
            indices.truncate(DB_SAMPLE_SIZE.min(self.dbs.len()));

            let mut set = JoinSet::new();
            for i in indices {
                let db = self.dbs[i].clone();
                let policy = self.policy;
                set.spawn_blocking(move || evict_one(&db, policy));
            }
            let mut evicted_any = false;
            while let Some(res) = set.join_next().await {
                if matches!(res, Ok(true)) {
                    evicted_any = true;
                }
            }

            if !evicted_any {
                warn!(
                    "eviction round found no candidate for policy {:?}; falling back to allkeys-random",
                    self.policy
                );
                if !evict_random_fallback(&self.dbs) {
                    return;
                }
            }
        }
    }
}

/// Samples candidates from one DB and evicts the worst one under the
/// given policy. Returns whether a key was actually removed.
fn evict_one(db: &Database, policy: EvictionPolicy) -> bool {
    if db.key_count() == 0 {
        return false;
    }
    let candidates = db.sample_candidates(KEY_SAMPLE_SIZE, policy.is_volatile_only());
    let victim = if policy.ranks_by_lfu() {
        candidates
            .into_iter()
            .filter_map(|k| db.recency_of(&k).map(|(_, lfu)| (k, lfu)))
            .min_by_key(|(_, lfu)| *lfu)
            .map(|(k, _)| k)
    } else {
        candidates
            .into_iter()
            .filter_map(|k| db.recency_of(&k).map(|(lru, _)| (k, lru)))
            .min_by_key(|(_, lru)| *lru)
            .map(|(k, _)| k)
    };
    match victim {
        Some(key) => db.evict_key(&key),
        None => false,
    }
}

/// Last-resort eviction when the configured policy can't find a
/// candidate (e.g. `volatile-*` with no TTL keys present) — a safeguard
/// against livelock, not spelled out in spec.md §4.8 but present in the
/// teacher's `evict_one_key` fallback.
fn evict_random_fallback(dbs: &[Database]) -> bool {
    for db in dbs {
        if let Some(key) = db.sample_candidates(1, false).into_iter().next() {
            return db.evict_key(&key);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::line::to_command_line;
    use crate::storage::time_wheel::TimeWheel;

    fn fresh_db(index: usize) -> Database {
        Database::new(index, TimeWheel::new(), None)
    }

    #[tokio::test]
    async fn evict_one_removes_a_key_under_lru_all() {
        let db = fresh_db(0);
        db.exec_normal(&to_command_line(&["SET", "a", "1"])).await;
        db.exec_normal(&to_command_line(&["SET", "b", "2"])).await;
        assert!(evict_one(&db, EvictionPolicy::LruAll));
        assert_eq!(db.key_count(), 1);
    }

    #[tokio::test]
    async fn evict_one_on_empty_db_is_noop() {
        let db = fresh_db(0);
        assert!(!evict_one(&db, EvictionPolicy::LruAll));
    }

    #[tokio::test]
    async fn volatile_policy_ignores_keys_without_ttl() {
        let db = fresh_db(0);
        db.exec_normal(&to_command_line(&["SET", "a", "1"])).await;
        assert!(!evict_one(&db, EvictionPolicy::LruTtl));
        assert_eq!(db.key_count(), 1);
    }

    #[tokio::test]
    async fn fallback_evicts_from_any_nonempty_db() {
        let dbs = [fresh_db(0), fresh_db(1)];
        dbs[1].exec_normal(&to_command_line(&["SET", "k", "v"])).await;
        assert!(evict_random_fallback(&dbs));
    }
}
