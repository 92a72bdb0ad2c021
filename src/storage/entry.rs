//! Entry: the value bound to a key. A tagged sum over the four data
//! types the core supports; type checks in executors reject foreign
//! variants with `WrongType` (§9 design note).
//!
//! Bitmap operations (SETBIT/GETBIT/BITCOUNT/BITPOS) are not a fifth
//! variant: in the wire protocol a bitmap *is* a string, so bit commands
//! borrow the `String` variant's bytes through [`Bitmap`] and write the
//! result back, matching spec.md §4.4's "thin wrapper over byte slice".

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::Error;

use super::dict::ShardedDict;
use super::list::List;
use super::zset::SortedSet;

/// Small shard count for hash field maps: a hash rarely has enough
/// fields to benefit from the dict's usual 16+ shards, but reusing C1
/// keeps the field map's locking story identical to the top-level dict
/// instead of introducing a second concurrency primitive.
const HASH_SHARD_CAPACITY: usize = 1;

pub enum DataValue {
    String(Bytes),
    List(List),
    Hash(ShardedDict<Bytes>),
    SortedSet(SortedSet),
}

impl DataValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::String(_) => "string",
            DataValue::List(_) => "list",
            DataValue::Hash(_) => "hash",
            DataValue::SortedSet(_) => "zset",
        }
    }

    pub fn new_hash() -> Self {
        DataValue::Hash(ShardedDict::with_capacity(HASH_SHARD_CAPACITY))
    }

    pub fn as_string(&self) -> Result<&Bytes, Error> {
        match self {
            DataValue::String(b) => Ok(b),
            _ => Err(Error::WrongType),
        }
    }

    pub fn as_string_mut(&mut self) -> Result<&mut Bytes, Error> {
        match self {
            DataValue::String(b) => Ok(b),
            _ => Err(Error::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&List, Error> {
        match self {
            DataValue::List(l) => Ok(l),
            _ => Err(Error::WrongType),
        }
    }

    pub fn as_list_mut(&mut self) -> Result<&mut List, Error> {
        match self {
            DataValue::List(l) => Ok(l),
            _ => Err(Error::WrongType),
        }
    }

    pub fn as_hash(&self) -> Result<&ShardedDict<Bytes>, Error> {
        match self {
            DataValue::Hash(h) => Ok(h),
            _ => Err(Error::WrongType),
        }
    }

    pub fn as_zset(&self) -> Result<&SortedSet, Error> {
        match self {
            DataValue::SortedSet(z) => Ok(z),
            _ => Err(Error::WrongType),
        }
    }

    pub fn as_zset_mut(&mut self) -> Result<&mut SortedSet, Error> {
        match self {
            DataValue::SortedSet(z) => Ok(z),
            _ => Err(Error::WrongType),
        }
    }

    /// A coarse byte-size estimate used by the eviction engine to decide
    /// when resident memory crosses `maxmemory`. Not an exact accounting
    /// of heap usage, just a stable ordering proxy.
    pub fn approx_size(&self) -> usize {
        const PER_ELEMENT_OVERHEAD: usize = 48;
        match self {
            DataValue::String(b) => b.len(),
            DataValue::List(l) => l.len() * PER_ELEMENT_OVERHEAD,
            DataValue::Hash(h) => h.len() as usize * PER_ELEMENT_OVERHEAD,
            DataValue::SortedSet(z) => z.len() * PER_ELEMENT_OVERHEAD,
        }
    }
}

pub fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// The value bound to a key, plus the access-recency counters eviction
/// reads (I5: updated on every read, need not be linearizable with
/// concurrent readers of the same key).
pub struct Entry {
    pub data: DataValue,
    pub lru: u32,
    pub lfu: u32,
}

impl Entry {
    pub fn new(data: DataValue) -> Self {
        Self {
            data,
            lru: now_secs(),
            lfu: 0,
        }
    }

    /// Updates recency/frequency counters. Called on every read path,
    /// mirroring (I5).
    pub fn touch(&mut self) {
        self.lru = now_secs();
        self.lfu = self.lfu.saturating_add(1);
    }
}
