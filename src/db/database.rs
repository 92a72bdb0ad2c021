//! C6: the single-database engine. Owns the entry/TTL/version maps for
//! one numbered database, dispatches normal commands under the striped
//! key lock, and runs the watched-key MULTI/EXEC transaction protocol
//! with undo-based rollback (spec.md §4.6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use crate::command::line::CommandLine;
use crate::command::registry::{self, CommandSpec};
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::reply::Reply;
use crate::storage::entry::{DataValue, Entry};
use crate::storage::{ShardedDict, StripedLock};
use crate::storage::time_wheel::TimeWheel;

use super::aof::AofSink;

/// Table size for the per-database striped key lock. Independent of the
/// data dict's own shard count (spec.md §4.2).
const DEFAULT_LOCK_STRIPES: usize = 256;

struct Inner {
    index: usize,
    data: ShardedDict<Entry>,
    ttl: ShardedDict<Instant>,
    version: ShardedDict<u32>,
    locker: StripedLock,
    time_wheel: TimeWheel,
    aof: Option<Arc<dyn AofSink>>,
}

/// A cheap-to-clone handle to one numbered database. Cloning shares the
/// same underlying maps (`Arc`), mirroring the teacher's `Db: Clone`
/// (`spineldb`'s `core/database/core.rs`) — needed here so the time
/// wheel's expiration closures can hold a handle back into the database
/// without borrowing it.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    pub fn new(index: usize, time_wheel: TimeWheel, aof: Option<Arc<dyn AofSink>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                index,
                data: ShardedDict::with_capacity(64),
                ttl: ShardedDict::with_capacity(16),
                version: ShardedDict::with_capacity(64),
                locker: StripedLock::new(DEFAULT_LOCK_STRIPES),
                time_wheel,
                aof,
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.inner.index
    }

    pub fn key_count(&self) -> u32 {
        self.inner.data.len()
    }

    // ---- data accessors used by command executors -----------------

    /// Reads a key's value, bumping its LRU/LFU counters (I5). Returns
    /// `None` for an absent *or* lazily-expired key.
    pub fn read_touch<R>(&self, key: &[u8], f: impl FnOnce(&DataValue) -> R) -> Option<R> {
        self.check_expired(key);
        self.inner
            .data
            .with_value_mut(key, |opt| opt.map(|e| (e.touch(), f(&e.data)).1))
    }

    /// Reads without mutating recency counters (used by enumeration
    /// paths that must not perturb LRU/LFU, per the teacher's
    /// `peek`/`get` split noted in SPEC_FULL.md).
    pub fn peek<R>(&self, key: &[u8], f: impl FnOnce(&DataValue) -> R) -> Option<R> {
        self.check_expired(key);
        self.inner.data.with_value(key, |opt| opt.map(|e| f(&e.data)))
    }

    pub fn write<R>(&self, key: &[u8], f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        self.check_expired(key);
        self.inner.data.with_value_mut(key, |opt| opt.map(f))
    }

    pub fn write_or_insert<R>(
        &self,
        key: Bytes,
        default: impl FnOnce() -> DataValue,
        f: impl FnOnce(&mut Entry) -> R,
    ) -> R {
        self.check_expired(&key);
        self.inner
            .data
            .with_entry_or_insert_mut(key, || Entry::new(default()), f)
    }

    pub fn set(&self, key: Bytes, value: DataValue) -> Option<Entry> {
        self.inner.data.put_take_old(key, Entry::new(value))
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.check_expired(key);
        self.inner.data.contains(key)
    }

    pub fn type_name(&self, key: &[u8]) -> Option<&'static str> {
        self.peek(key, |v| v.type_name())
    }

    /// Removes a key's entry, TTL, and any pending expiration task (I2).
    pub fn remove_key(&self, key: &[u8]) -> bool {
        self.inner.time_wheel.cancel(key);
        self.inner.ttl.remove(key);
        self.inner.data.remove(key) == 1
    }

    pub fn take_key(&self, key: &[u8]) -> Option<Entry> {
        self.inner.time_wheel.cancel(key);
        self.inner.ttl.remove(key);
        self.inner.data.remove_take(key)
    }

    pub fn clear(&self) {
        self.inner.data.clear();
        self.inner.ttl.clear();
        self.inner.version.clear();
    }

    // ---- eviction support (spec.md §4.8) ---------------------------

    /// Samples up to `n` distinct candidate keys for the eviction engine:
    /// from the full key set, or from just the keys carrying a TTL.
    pub fn sample_candidates(&self, n: usize, volatile_only: bool) -> Vec<Bytes> {
        if volatile_only {
            self.inner.ttl.random_distinct_keys(n)
        } else {
            self.inner.data.random_distinct_keys(n)
        }
    }

    /// `(lru, lfu)` for a still-present key, without touching either
    /// counter (the eviction engine must not perturb recency while
    /// deciding who to evict).
    pub fn recency_of(&self, key: &[u8]) -> Option<(u32, u32)> {
        self.inner.data.with_value(key, |opt| opt.map(|e| (e.lru, e.lfu)))
    }

    /// Evicts `key` outright: drops its entry, TTL, and pending
    /// expiration task, the same cleanup a `DEL` performs (I2).
    pub fn evict_key(&self, key: &[u8]) -> bool {
        self.remove_key(key)
    }

    /// Coarse resident-memory estimate for this database, summing each
    /// entry's key length and [`DataValue::approx_size`].
    pub fn approx_memory(&self) -> usize {
        let mut total = 0usize;
        self.inner.data.for_each(|k, e| total += k.len() + e.data.approx_size());
        total
    }

    // ---- cluster coordinator support (spec.md §4.12) ----------------

    /// Acquires this database's key lock in write mode for `keys`,
    /// returning a guard the caller can hold across an `.await` (the
    /// cluster coordinator's two-phase protocol holds it across a
    /// network round-trip).
    pub async fn lock_keys(&self, keys: &[Bytes]) -> crate::storage::lock::KeyLockGuard {
        self.inner.locker.locks(keys).await
    }

    /// `DumpKey`: removes `key` and returns its entry plus remaining TTL,
    /// for transfer to another node (`RENAME`/`RENAMENX` across a cluster
    /// slot boundary). Caller must already hold `key`'s write lock.
    pub fn dump_key(&self, key: &[u8]) -> Option<(Entry, Option<std::time::Duration>)> {
        let ttl = self.ttl_remaining(key);
        self.take_key(key).map(|entry| (entry, ttl))
    }

    // ---- TTL (spec.md §4.6 "TTL") ----------------------------------

    /// Lazy read-side check: if `key`'s TTL has passed, remove it inline
    /// and return `true`. Never itself acquires the striped key lock —
    /// callers already hold it for this key via `exec_normal`/`exec_multi`,
    /// and `tokio::sync::RwLock` is not reentrant.
    pub fn check_expired(&self, key: &[u8]) -> bool {
        let Some(at) = self.inner.ttl.get(key) else {
            return false;
        };
        if Instant::now() < at {
            return false;
        }
        self.inner.time_wheel.cancel(key);
        self.inner.ttl.remove(key);
        self.inner.data.remove(key);
        true
    }

    pub fn expire_at(&self, key: Bytes, at: Instant) {
        self.inner.ttl.put(key.clone(), at);
        let db = self.clone();
        let task_key = key.clone();
        self.inner.time_wheel.at(
            at,
            task_key,
            Box::new(move || Box::pin(async move { db.fire_expire(key).await })),
        );
    }

    /// Cancels a pending TTL. Returns `true` if one was present.
    pub fn persist(&self, key: &[u8]) -> bool {
        self.inner.time_wheel.cancel(key);
        self.inner.ttl.remove(key) == 1
    }

    pub fn ttl_remaining(&self, key: &[u8]) -> Option<std::time::Duration> {
        self.inner
            .ttl
            .get(key)
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn has_ttl(&self, key: &[u8]) -> bool {
        self.inner.ttl.contains(key)
    }

    /// Background handler for a time-wheel-fired expiration. Runs off the
    /// request path (its own spawned task), so it re-acquires the key's
    /// write lock and re-checks the precondition (check-lock-check).
    async fn fire_expire(&self, key: Bytes) {
        let _guard = self.inner.locker.lock(&key).await;
        if self.check_expired(&key) {
            self.bump_version(&key);
            self.emit_aof(&vec![Bytes::from_static(b"DEL"), key]);
        }
    }

    // ---- versioning (I3/I4) ----------------------------------------

    pub fn current_version(&self, key: &[u8]) -> u32 {
        self.inner.version.get(key).unwrap_or(0)
    }

    pub fn bump_version(&self, key: &[u8]) {
        self.inner.version.with_entry_or_insert_mut(
            Bytes::copy_from_slice(key),
            || 0,
            |v| *v = v.wrapping_add(1),
        );
    }

    fn bump_versions<'a>(&self, keys: impl IntoIterator<Item = &'a Bytes>) {
        for k in keys {
            self.bump_version(k);
        }
    }

    fn emit_aof(&self, cmd_line: &CommandLine) {
        if let Some(aof) = &self.inner.aof {
            aof.record(self.inner.index, cmd_line);
        }
    }

    // ---- dispatch (spec.md §4.6) ------------------------------------

    /// Dispatches MULTI/DISCARD/EXEC/WATCH/UNWATCH as connection-state
    /// transitions; otherwise queues (if in MULTI) or runs the command.
    pub async fn exec(&self, conn: &mut ConnectionState, cmd_line: &CommandLine) -> Reply {
        if cmd_line.is_empty() {
            return Reply::Error(Error::UnknownCommand(String::new()).to_string());
        }
        let name = cmd_line[0].to_ascii_uppercase();
        match name.as_slice() {
            b"MULTI" => self.handle_multi(conn),
            b"DISCARD" => self.handle_discard(conn),
            b"WATCH" => self.handle_watch(conn, &cmd_line[1..]),
            b"UNWATCH" => {
                conn.unwatch();
                Reply::ok()
            }
            b"EXEC" => self.handle_exec(conn).await,
            _ => {
                if conn.in_multi {
                    self.queue_command(conn, cmd_line)
                } else {
                    self.exec_normal(cmd_line).await
                }
            }
        }
    }

    pub(crate) fn handle_multi(&self, conn: &mut ConnectionState) -> Reply {
        if conn.in_multi {
            return Error::NestedMulti.into();
        }
        conn.start_multi();
        Reply::ok()
    }

    pub(crate) fn handle_discard(&self, conn: &mut ConnectionState) -> Reply {
        if !conn.in_multi {
            return Error::DiscardWithoutMulti.into();
        }
        conn.discard_multi();
        conn.unwatch();
        Reply::ok()
    }

    pub(crate) fn handle_watch(&self, conn: &mut ConnectionState, keys: &[Bytes]) -> Reply {
        if conn.in_multi {
            return Error::NotAllowedInMulti("WATCH".to_string()).into();
        }
        for key in keys {
            self.check_expired(key);
            let version = self.current_version(key);
            conn.watch(key.clone(), version);
        }
        Reply::ok()
    }

    pub(crate) fn queue_command(&self, conn: &mut ConnectionState, cmd_line: &CommandLine) -> Reply {
        let Some(spec) = registry::lookup(&cmd_line[0]) else {
            conn.multi_has_error = true;
            return Error::UnknownCommand(String::from_utf8_lossy(&cmd_line[0]).to_string())
                .into();
        };
        if let Err(e) = spec.validate_arity(cmd_line.len()) {
            conn.multi_has_error = true;
            return e.into();
        }
        conn.queue.push(crate::connection::QueuedCommand {
            line: cmd_line.clone(),
        });
        Reply::queued()
    }

    async fn handle_exec(&self, conn: &mut ConnectionState) -> Reply {
        match self.take_exec_payload(conn) {
            Err(reply) => reply,
            Ok((watching, queue)) => self.exec_multi(watching, queue).await,
        }
    }

    /// Drains a MULTI block's queued commands and watch set, resetting
    /// `conn`'s transaction state, without running anything. Returns
    /// `Err(reply)` for the cases that short-circuit before any command
    /// runs (no MULTI in progress, or a queue-time error forcing
    /// `EXECABORT`); otherwise `Ok((watching, queue))` for the caller to
    /// drive through `exec_multi` — exposed so the cluster coordinator
    /// (spec.md §4.12 "cross-node MULTI/EXEC") can inspect the same
    /// queue and route it to a peer instead of running it locally.
    pub(crate) fn take_exec_payload(
        &self,
        conn: &mut ConnectionState,
    ) -> std::result::Result<(HashMap<Bytes, u32>, Vec<CommandLine>), Reply> {
        if !conn.in_multi {
            return Err(Error::ExecWithoutMulti.into());
        }
        let had_error = conn.multi_has_error;
        let queue: Vec<CommandLine> = conn.queue.drain(..).map(|q| q.line).collect();
        let watching = std::mem::take(&mut conn.watched);
        conn.in_multi = false;
        conn.multi_has_error = false;
        if had_error {
            return Err(Error::ExecAbort.into());
        }
        Ok((watching, queue))
    }

    /// Runs one already-validated command outside of any transaction,
    /// under the striped key lock for its resolved key set.
    pub async fn exec_normal(&self, cmd_line: &CommandLine) -> Reply {
        let Some(spec) = registry::lookup(&cmd_line[0]) else {
            return Error::UnknownCommand(String::from_utf8_lossy(&cmd_line[0]).to_string()).into();
        };
        if let Err(e) = spec.validate_arity(cmd_line.len()) {
            return e.into();
        }
        let key_spec = match (spec.prepare)(cmd_line) {
            Ok(ks) => ks,
            Err(e) => return e.into(),
        };
        // Pre-bump under no lock: only observed by WATCH, which itself
        // acquires a read lock on the key before reading the version
        // (I3/I4 — see spec.md §4.6).
        self.bump_versions(&key_spec.write_keys);
        let _guard = self
            .inner
            .locker
            .rw_locks(&key_spec.write_keys, &key_spec.read_keys)
            .await;
        let reply = self.run_catching(spec, cmd_line);
        if spec.is_write() && !reply.is_error() {
            self.emit_aof(cmd_line);
        }
        reply
    }

    /// Executes `cmd_line` under locks the caller already holds (used by
    /// the cluster prepare path, spec.md §4.6 "ExecWithLock").
    pub fn exec_with_lock(&self, cmd_line: &CommandLine) -> Reply {
        let Some(spec) = registry::lookup(&cmd_line[0]) else {
            return Error::UnknownCommand(String::from_utf8_lossy(&cmd_line[0]).to_string()).into();
        };
        self.run_catching(spec, cmd_line)
    }

    fn run_catching(&self, spec: CommandSpec, cmd_line: &CommandLine) -> Reply {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (spec.execute)(self, cmd_line)
        }));
        match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => e.into(),
            Err(_) => Error::Internal("unknown error".to_string()).into(),
        }
    }

    /// The watched-key transaction protocol (spec.md §4.6, P4, P6).
    pub async fn exec_multi(
        &self,
        watching: HashMap<Bytes, u32>,
        queue: Vec<CommandLine>,
    ) -> Reply {
        let mut write_union: Vec<Bytes> = Vec::new();
        let mut read_union: Vec<Bytes> = watching.keys().cloned().collect();
        let mut prepared: Vec<(CommandSpec, crate::command::registry::KeySpec)> =
            Vec::with_capacity(queue.len());
        for line in &queue {
            // Every queued command was already validated to exist at
            // queue time; a missing spec here would be a logic error.
            let spec = registry::lookup(&line[0]).expect("queued command must be registered");
            let ks = match (spec.prepare)(line) {
                Ok(ks) => ks,
                Err(e) => return e.into(),
            };
            write_union.extend(ks.write_keys.iter().cloned());
            read_union.extend(ks.read_keys.iter().cloned());
            prepared.push((spec, ks));
        }

        let _guard = self.inner.locker.rw_locks(&write_union, &read_union).await;

        for (key, captured) in &watching {
            if self.current_version(key) != *captured {
                return Reply::NullArray;
            }
        }

        let mut replies = Vec::with_capacity(queue.len());
        // One entry per command that recorded an undo plan, each entry's
        // own lines kept in their recorded (forward-execution) order —
        // only the entries themselves replay newest-to-oldest, per
        // spec.md §4.6 ("replay recorded undo plans from newest to
        // oldest"). Flattening and reversing the whole line sequence
        // would also reverse a single command's multi-line plan (e.g.
        // `RollbackFirstKey`'s `DEL` followed by the value rebuild).
        let mut undo_log: Vec<Vec<CommandLine>> = Vec::new();
        let mut aborted = false;
        for ((spec, _ks), line) in prepared.iter().zip(queue.iter()) {
            let undo_entry = spec.undo.and_then(|undo_fn| undo_fn(self, line));
            let reply = self.run_catching(*spec, line);
            if reply.is_error() {
                aborted = true;
                replies.push(reply);
                break;
            }
            if let Some(lines) = undo_entry {
                undo_log.push(lines);
            }
            replies.push(reply);
        }

        if aborted {
            for entry in undo_log.into_iter().rev() {
                for undo_line in entry {
                    self.exec_with_lock(&undo_line);
                }
            }
            return Error::ExecAbort.into();
        }

        self.bump_versions(&write_union);
        for line in &queue {
            self.emit_aof(line);
        }
        Reply::Array(replies)
    }
}
