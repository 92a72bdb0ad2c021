//! C1: a fixed array of shards, each an independent read/write-locked
//! hash map. Routing is `(shard_count - 1) & fnv1a32(key)`, so the shard
//! count must be a power of two.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

use super::hash::{fnv1a32, next_pow2_at_least_16};

struct Shard<V> {
    map: HashMap<Bytes, V>,
}

/// A concurrent key→value map sharded for parallel access. `ForEach`
/// iterates shard by shard, taking each shard's read lock only for the
/// duration of that shard's iteration — it is not a cross-shard snapshot.
pub struct ShardedDict<V> {
    shards: Vec<RwLock<Shard<V>>>,
    count: AtomicU32,
}

impl<V> ShardedDict<V> {
    pub fn with_capacity(requested_capacity: usize) -> Self {
        let shard_count = next_pow2_at_least_16(requested_capacity);
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(RwLock::new(Shard {
                map: HashMap::new(),
            }));
        }
        Self {
            shards,
            count: AtomicU32::new(0),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_index(&self, key: &[u8]) -> usize {
        (self.shards.len() - 1) & (fnv1a32(key) as usize)
    }

    pub fn len(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &[u8]) -> Option<V>
    where
        V: Clone,
    {
        let shard = &self.shards[self.shard_index(key)];
        shard.read().map.get(key).cloned()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let shard = &self.shards[self.shard_index(key)];
        shard.read().map.contains_key(key)
    }

    /// Runs `f` with shared access to the value, under the shard's read
    /// lock, without requiring `V: Clone`.
    pub fn with_value<R>(&self, key: &[u8], f: impl FnOnce(Option<&V>) -> R) -> R {
        let shard = &self.shards[self.shard_index(key)];
        let guard = shard.read();
        f(guard.map.get(key))
    }

    /// Runs `f` with exclusive access to the value, under the shard's
    /// write lock.
    pub fn with_value_mut<R>(&self, key: &[u8], f: impl FnOnce(Option<&mut V>) -> R) -> R {
        let shard = &self.shards[self.shard_index(key)];
        let mut guard = shard.write();
        f(guard.map.get_mut(key))
    }

    /// Creates the entry with `default` if absent, then runs `f` against
    /// it under the shard's write lock.
    pub fn with_entry_or_insert_mut<R>(
        &self,
        key: Bytes,
        default: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R {
        let shard = &self.shards[self.shard_index(&key)];
        let mut guard = shard.write();
        let is_new = !guard.map.contains_key(&key);
        let slot = guard.map.entry(key).or_insert_with(default);
        let result = f(slot);
        if is_new {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Returns 1 if this inserted a new key, 0 if it replaced an existing one.
    pub fn put(&self, key: Bytes, value: V) -> u32 {
        let shard = &self.shards[self.shard_index(&key)];
        let mut guard = shard.write();
        let is_new = guard.map.insert(key, value).is_none();
        if is_new {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        is_new as u32
    }

    /// Inserts only if absent. Returns 1 on insert, 0 if the key already existed.
    pub fn put_if_absent(&self, key: Bytes, value: V) -> u32 {
        let shard = &self.shards[self.shard_index(&key)];
        let mut guard = shard.write();
        if guard.map.contains_key(&key) {
            return 0;
        }
        guard.map.insert(key, value);
        self.count.fetch_add(1, Ordering::Relaxed);
        1
    }

    /// Inserts, returning whatever value previously occupied the key, if any.
    pub fn put_take_old(&self, key: Bytes, value: V) -> Option<V> {
        let shard = &self.shards[self.shard_index(&key)];
        let mut guard = shard.write();
        let old = guard.map.insert(key, value);
        if old.is_none() {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        old
    }

    /// Removes a key, returning its value if present.
    pub fn remove_take(&self, key: &[u8]) -> Option<V> {
        let shard = &self.shards[self.shard_index(key)];
        let mut guard = shard.write();
        let old = guard.map.remove(key);
        if old.is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
        old
    }

    /// Replaces only if present. Returns 1 on replace, 0 if the key was absent.
    pub fn put_if_exists(&self, key: &[u8], value: V) -> u32 {
        let shard = &self.shards[self.shard_index(key)];
        let mut guard = shard.write();
        match guard.map.get_mut(key) {
            Some(slot) => {
                *slot = value;
                1
            }
            None => 0,
        }
    }

    pub fn remove(&self, key: &[u8]) -> u32 {
        let shard = &self.shards[self.shard_index(key)];
        let mut guard = shard.write();
        let removed = guard.map.remove(key).is_some();
        if removed {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
        removed as u32
    }

    pub fn for_each(&self, mut f: impl FnMut(&Bytes, &V)) {
        for shard in &self.shards {
            let guard = shard.read();
            for (k, v) in guard.map.iter() {
                f(k, v);
            }
        }
    }

    pub fn for_each_mut(&self, mut f: impl FnMut(&Bytes, &mut V)) {
        for shard in &self.shards {
            let mut guard = shard.write();
            for (k, v) in guard.map.iter_mut() {
                f(k, v);
            }
        }
    }

    /// `n` samples with replacement, uniform over non-empty shards.
    pub fn random_keys(&self, n: usize) -> Vec<Bytes> {
        let mut rng = rand::thread_rng();
        let non_empty: Vec<usize> = self
            .shards
            .iter()
            .enumerate()
            .filter_map(|(i, s)| (!s.read().map.is_empty()).then_some(i))
            .collect();
        if non_empty.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let idx = non_empty[rng.gen_range(0..non_empty.len())];
            let guard = self.shards[idx].read();
            if let Some(key) = guard.map.keys().nth(rng.gen_range(0..guard.map.len())) {
                out.push(key.clone());
            }
        }
        out
    }

    /// `n` samples without replacement, clamped to `len()`.
    pub fn random_distinct_keys(&self, n: usize) -> Vec<Bytes> {
        let n = n.min(self.len() as usize);
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::with_capacity(n);
        let mut attempts = 0usize;
        // Resampling approximation: stop after a bounded number of misses
        // so a near-full dict doesn't spin forever on the last few keys.
        while out.len() < n && attempts < n.saturating_mul(20).max(64) {
            attempts += 1;
            for key in self.random_keys(1) {
                if seen.insert(key.clone()) {
                    out.push(key);
                }
            }
        }
        out
    }

    pub fn clear(&self) {
        let shard_count = self.shards.len();
        for shard in &self.shards {
            let mut guard = shard.write();
            guard.map = HashMap::with_capacity(0);
        }
        let _ = shard_count;
        self.count.store(0, Ordering::Relaxed);
    }
}
