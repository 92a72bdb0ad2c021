//! C2: striped key locking. Independent from the sharded dict's own
//! table size — the two are routed by the same hash function but never
//! need to agree on layout.
//!
//! Guards are acquired with `tokio::sync::RwLock` rather than a sync
//! mutex because the cluster coordinator's two-phase protocol holds a
//! key's write lock across a network round-trip (§4.12): a sync guard
//! can't be held across an `.await`.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use super::hash::fnv1a32;

enum StripeGuard {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

/// Holds every stripe lock acquired for one call. Stripes are stored in
/// descending index order so dropping the vector releases them in
/// descending order, mirroring the acquire-ascending/release-descending
/// discipline the spec calls for (acquisition order is what actually
/// prevents deadlock; release order is kept symmetric for clarity).
pub struct KeyLockGuard {
    _guards: Vec<StripeGuard>,
}

pub struct StripedLock {
    stripes: Vec<Arc<RwLock<()>>>,
}

impl StripedLock {
    pub fn new(table_size: usize) -> Self {
        let table_size = table_size.max(1);
        let stripes = (0..table_size).map(|_| Arc::new(RwLock::new(()))).collect();
        Self { stripes }
    }

    fn index(&self, key: &[u8]) -> usize {
        (self.stripes.len() - 1) & (fnv1a32(key) as usize)
    }

    pub async fn lock(&self, key: &[u8]) -> KeyLockGuard {
        self.rw_locks(std::slice::from_ref(&Bytes::copy_from_slice(key)), &[])
            .await
    }

    pub async fn rlock(&self, key: &[u8]) -> KeyLockGuard {
        self.rw_locks(&[], std::slice::from_ref(&Bytes::copy_from_slice(key)))
            .await
    }

    pub async fn locks(&self, keys: &[Bytes]) -> KeyLockGuard {
        self.rw_locks(keys, &[]).await
    }

    pub async fn rlocks(&self, keys: &[Bytes]) -> KeyLockGuard {
        self.rw_locks(&[], keys).await
    }

    /// A stripe index touched by any key in `write_keys` is acquired in
    /// write mode; otherwise, if touched by `read_keys`, in read mode.
    /// Acquired ascending by index.
    pub async fn rw_locks(&self, write_keys: &[Bytes], read_keys: &[Bytes]) -> KeyLockGuard {
        let write_indices: BTreeSet<usize> =
            write_keys.iter().map(|k| self.index(k)).collect();
        let mut all_indices: BTreeSet<usize> = write_indices.clone();
        all_indices.extend(read_keys.iter().map(|k| self.index(k)));

        let mut acquired = Vec::with_capacity(all_indices.len());
        for idx in &all_indices {
            let stripe = Arc::clone(&self.stripes[*idx]);
            if write_indices.contains(idx) {
                acquired.push(StripeGuard::Write(stripe.write_owned().await));
            } else {
                acquired.push(StripeGuard::Read(stripe.read_owned().await));
            }
        }
        acquired.reverse();
        KeyLockGuard { _guards: acquired }
    }
}
