//! C12: the cluster coordinator (spec.md §4.12). Routes by key through
//! the consistent hash ring (C11), takes a fast path when a whole
//! request lands on one peer, and otherwise drives a two-phase
//! prepare/commit/rollback protocol for `DEL`/`RENAME`/`RENAMENX` and a
//! single-slot relay for cross-node `MULTI`/`EXEC`.
//!
//! Grounded on `internal/cluster/{cluster,com,del,rename,multi,utils,
//! pubsub,keys}.go`: `groupBy`, the fast-path bypass, the
//! Prepare/Commit/Rollback fan-out, and `PUBLISH`'s broadcast-to-all-
//! peers are all direct translations of that file set's control flow
//! into async Rust, with the literal TCC bookkeeping (`tcc.go` in the Go
//! tree, not present in this pack) designed from spec.md §4.12's own
//! description of participant state: a held key lock plus an undo plan
//! per `txID`. Because nothing is written to a participant's dict until
//! its own `Commit` step, the "undo plan" for `DEL` and `RenameTo` is
//! trivially empty (`Rollback` only needs to release the lock); only
//! `RenameFrom` mutates ahead of the top-level `Commit` return, and it
//! does so inside its own commit handler, not at prepare time — see
//! `handle_commit` below.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::warn;

use crate::command::line::CommandLine;
use crate::command::registry;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::pubsub::SharedPubSubHub;
use crate::reply::Reply;
use crate::storage::lock::KeyLockGuard;

use super::ring::ConsistentHashRing;
use super::idgen::SnowflakeIdGen;
use super::transport::{
    ClusterTransport, CommitAck, CommitPayload, PeerReply, PeerRequest, PrepareAck, PrepareOp,
};

enum PreparedOp {
    Del { keys: Vec<Bytes> },
    RenameFrom { key: Bytes },
    RenameTo { key: Bytes },
}

struct PendingTx {
    db_index: usize,
    guard: KeyLockGuard,
    op: PreparedOp,
}

pub struct Coordinator {
    self_id: String,
    ring: ConsistentHashRing,
    known_peers: Vec<String>,
    dbs: Arc<[Database]>,
    pubsub: SharedPubSubHub,
    transport: Arc<dyn ClusterTransport>,
    id_gen: SnowflakeIdGen,
    pending: DashMap<i64, PendingTx>,
}

impl Coordinator {
    pub fn new(
        self_id: String,
        peers: &[String],
        dbs: Arc<[Database]>,
        pubsub: SharedPubSubHub,
        transport: Arc<dyn ClusterTransport>,
    ) -> Self {
        let mut ring = ConsistentHashRing::new(REPLICAS);
        let mut nodes: Vec<String> = peers.to_vec();
        if !nodes.contains(&self_id) {
            nodes.push(self_id.clone());
        }
        ring.add_node(&nodes);
        let id_gen = SnowflakeIdGen::new(&self_id);
        Self {
            self_id,
            ring,
            known_peers: nodes,
            dbs,
            pubsub,
            transport,
            id_gen,
            pending: DashMap::new(),
        }
    }

    fn db(&self, index: usize) -> &Database {
        &self.dbs[index]
    }

    /// Whether this node currently owns `key` on the consistent-hash
    /// ring — used by the server layer's WATCH handling to decide
    /// between a local version read and a `GetVer` round-trip (spec.md
    /// §4.12).
    pub fn owns(&self, key: &[u8]) -> bool {
        self.ring.pick_node(key).as_deref() == Some(self.self_id.as_str())
    }

    /// For each key, the peer id `PickNode` resolves it to.
    fn group_by(&self, keys: &[Bytes]) -> HashMap<String, Vec<Bytes>> {
        let mut groups: HashMap<String, Vec<Bytes>> = HashMap::new();
        for key in keys {
            if let Some(peer) = self.ring.pick_node(key) {
                groups.entry(peer).or_default().push(key.clone());
            }
        }
        groups
    }

    async fn dispatch(&self, peer: &str, req: PeerRequest) -> PeerReply {
        if peer == self.self_id {
            self.handle_request(req).await
        } else {
            self.transport.dispatch(peer, req).await
        }
    }

    async fn relay_exec(&self, peer: &str, db_index: usize, cmd_line: CommandLine) -> Reply {
        match self.dispatch(peer, PeerRequest::Exec { db_index, cmd_line }).await {
            PeerReply::Reply(r) => r,
            _ => Error::Internal("unexpected peer reply to Exec".to_string()).into(),
        }
    }

    async fn dispatch_prepare(
        &self,
        peer: &str,
        db_index: usize,
        tx_id: i64,
        op: PrepareOp,
    ) -> Result<PrepareAck> {
        match self.dispatch(peer, PeerRequest::Prepare { db_index, tx_id, op }).await {
            PeerReply::Prepared(r) => r,
            _ => Err(Error::Internal("unexpected peer reply to Prepare".to_string())),
        }
    }

    async fn dispatch_commit(
        &self,
        peer: &str,
        db_index: usize,
        tx_id: i64,
        payload: CommitPayload,
    ) -> Result<CommitAck> {
        match self
            .dispatch(peer, PeerRequest::Commit { db_index, tx_id, payload })
            .await
        {
            PeerReply::Committed(r) => r,
            _ => Err(Error::Internal("unexpected peer reply to Commit".to_string())),
        }
    }

    async fn dispatch_rollback(&self, peer: &str, db_index: usize, tx_id: i64) {
        let _ = self.dispatch(peer, PeerRequest::Rollback { db_index, tx_id }).await;
    }

    async fn rollback_all(&self, peers: &[String], db_index: usize, tx_id: i64) {
        for peer in peers {
            self.dispatch_rollback(peer, db_index, tx_id).await;
        }
    }

    // ---- generic keyed-command fast path (spec.md §4.12 "Fast path") --

    /// Routes an ordinary keyed command (`GET`/`SET`/`INCR`/`LPUSH`/…) by
    /// its resolved key set: if every key lands on one peer — `self`
    /// included — relay the whole command there via [`Coordinator::relay_exec`];
    /// otherwise the command spans more than one slot, which only
    /// `DEL`/`RENAME`/`RENAMENX` have a two-phase protocol for (spec.md
    /// §4.12 "Two-phase multi-key writes"), so it's rejected the same way
    /// a cross-slot `MULTI` is.
    pub async fn route_keyed(&self, db_index: usize, keys: &[Bytes], cmd_line: CommandLine) -> Reply {
        let groups = self.group_by(keys);
        match groups.len() {
            1 => {
                let peer = groups.keys().next().expect("groups.len() == 1");
                self.relay_exec(peer, db_index, cmd_line).await
            }
            _ => Error::ClusterSlot.into(),
        }
    }

    // ---- DEL (spec.md §4.12 two-phase multi-key writes) --------------

    pub async fn del(&self, db_index: usize, keys: Vec<Bytes>) -> Reply {
        if keys.is_empty() {
            return Error::WrongNumArgs("del".to_string()).into();
        }
        let groups = self.group_by(&keys);
        if groups.len() <= 1 {
            let peer = groups.keys().next().cloned().unwrap_or_else(|| self.self_id.clone());
            let mut cmd_line = vec![Bytes::from_static(b"DEL")];
            cmd_line.extend(keys);
            return self.relay_exec(&peer, db_index, cmd_line).await;
        }

        let tx_id = self.id_gen.next_id();
        let mut prepared = Vec::with_capacity(groups.len());
        for (peer, peer_keys) in &groups {
            let op = PrepareOp::Del { keys: peer_keys.clone() };
            match self.dispatch_prepare(peer, db_index, tx_id, op).await {
                Ok(_) => prepared.push(peer.clone()),
                Err(e) => {
                    self.rollback_all(&prepared, db_index, tx_id).await;
                    return e.into();
                }
            }
        }

        let mut total = 0i64;
        for peer in &prepared {
            match self.dispatch_commit(peer, db_index, tx_id, CommitPayload::None).await {
                Ok(CommitAck::Del { count }) => total += count,
                Ok(_) => {
                    self.rollback_all(&prepared, db_index, tx_id).await;
                    return Error::Internal("unexpected commit ack for DEL".to_string()).into();
                }
                Err(e) => {
                    self.rollback_all(&prepared, db_index, tx_id).await;
                    return e.into();
                }
            }
        }
        Reply::Integer(total)
    }

    // ---- RENAME / RENAMENX --------------------------------------------

    pub async fn rename(&self, db_index: usize, src: Bytes, dest: Bytes) -> Reply {
        match self.do_rename(db_index, src, dest, false).await {
            Ok(_) => Reply::ok(),
            Err(e) => e.into(),
        }
    }

    pub async fn renamenx(&self, db_index: usize, src: Bytes, dest: Bytes) -> Reply {
        match self.do_rename(db_index, src, dest, true).await {
            Ok(renamed) => Reply::Integer(if renamed { 1 } else { 0 }),
            Err(e) => e.into(),
        }
    }

    async fn do_rename(
        &self,
        db_index: usize,
        src: Bytes,
        dest: Bytes,
        check_absent: bool,
    ) -> Result<bool> {
        let Some(src_peer) = self.ring.pick_node(&src) else {
            return Err(Error::Internal("cluster ring has no nodes".to_string()));
        };
        let Some(dest_peer) = self.ring.pick_node(&dest) else {
            return Err(Error::Internal("cluster ring has no nodes".to_string()));
        };

        if src_peer == dest_peer {
            let cmd = if check_absent { "RENAMENX" } else { "RENAME" };
            let reply = self
                .relay_exec(
                    &src_peer,
                    db_index,
                    vec![Bytes::copy_from_slice(cmd.as_bytes()), src, dest],
                )
                .await;
            return match reply {
                Reply::Error(e) => Err(Error::Internal(e)),
                Reply::Integer(n) => Ok(n != 0),
                _ => Ok(true),
            };
        }

        let tx_id = self.id_gen.next_id();
        if let Err(e) = self
            .dispatch_prepare(&src_peer, db_index, tx_id, PrepareOp::RenameFrom { key: src.clone() })
            .await
        {
            return Err(e);
        }
        let dest_prepare = self
            .dispatch_prepare(
                &dest_peer,
                db_index,
                tx_id,
                PrepareOp::RenameTo { key: dest.clone(), check_absent },
            )
            .await;
        if let Err(e) = dest_prepare {
            self.dispatch_rollback(&src_peer, db_index, tx_id).await;
            // spec.md's supplemented behavior: RENAMENX's cluster path
            // reports a missing write as integer 0, not a propagated
            // error, when the destination already exists.
            if check_absent && e == Error::KeyExists {
                return Ok(false);
            }
            return Err(e);
        }

        let src_commit = self.dispatch_commit(&src_peer, db_index, tx_id, CommitPayload::None).await;
        let (value, ttl) = match src_commit {
            Ok(CommitAck::RenameFrom { value, ttl }) => (value, ttl),
            Ok(_) => {
                self.dispatch_rollback(&dest_peer, db_index, tx_id).await;
                return Err(Error::Internal("unexpected commit ack for RenameFrom".to_string()));
            }
            Err(e) => {
                self.dispatch_rollback(&dest_peer, db_index, tx_id).await;
                return Err(e);
            }
        };

        match self
            .dispatch_commit(&dest_peer, db_index, tx_id, CommitPayload::RenameValue { value, ttl })
            .await
        {
            Ok(CommitAck::RenameTo) => Ok(true),
            Ok(_) => Err(Error::Internal("unexpected commit ack for RenameTo".to_string())),
            Err(e) => {
                // The source side already committed (its key is gone);
                // per spec.md §5 the two-phase protocol is not atomic
                // across this kind of partial failure, so this is
                // surfaced rather than silently swallowed.
                warn!("rename commit on destination peer failed after source committed: {e}");
                Err(e)
            }
        }
    }

    // ---- cross-node MULTI/EXEC -----------------------------------------

    pub async fn exec_multi(
        &self,
        db_index: usize,
        watching: HashMap<Bytes, u32>,
        queue: Vec<CommandLine>,
    ) -> Reply {
        let mut keys: Vec<Bytes> = watching.keys().cloned().collect();
        for line in &queue {
            let Some(spec) = registry::lookup(&line[0]) else {
                return Error::UnknownCommand(String::from_utf8_lossy(&line[0]).to_string()).into();
            };
            match (spec.prepare)(line) {
                Ok(ks) => {
                    keys.extend(ks.write_keys);
                    keys.extend(ks.read_keys);
                }
                Err(e) => return e.into(),
            }
        }
        if keys.is_empty() {
            return self.db(db_index).exec_multi(watching, queue).await;
        }
        let groups = self.group_by(&keys);
        if groups.len() > 1 {
            return Error::ClusterSlot.into();
        }
        let peer = groups.keys().next().cloned().unwrap_or_else(|| self.self_id.clone());
        if peer == self.self_id {
            return self.db(db_index).exec_multi(watching, queue).await;
        }
        match self
            .dispatch(
                &peer,
                PeerRequest::RelayMulti {
                    db_index,
                    watching: watching.into_iter().collect(),
                    queue,
                },
            )
            .await
        {
            PeerReply::Reply(r) => r,
            _ => Error::Internal("unexpected peer reply to RelayMulti".to_string()).into(),
        }
    }

    /// `GetVer`: used by a non-owning node to learn a key's current
    /// version before adding it to a connection's watch set.
    pub async fn get_version(&self, db_index: usize, key: &Bytes) -> u32 {
        let Some(peer) = self.ring.pick_node(key) else {
            return 0;
        };
        match self.dispatch(&peer, PeerRequest::GetVer { db_index, key: key.clone() }).await {
            PeerReply::Version(v) => v,
            _ => 0,
        }
    }

    // ---- Pub/Sub --------------------------------------------------------

    /// `PUBLISH` broadcasts to every peer; each delivers to its own
    /// local subscribers and the counts sum.
    pub async fn publish(&self, db_index: usize, channel: Bytes, payload: Bytes) -> Reply {
        let mut total = 0i64;
        for peer in self.peers() {
            match self
                .dispatch(
                    &peer,
                    PeerRequest::Publish { db_index, channel: channel.clone(), payload: payload.clone() },
                )
                .await
            {
                PeerReply::Reply(Reply::Integer(n)) => total += n,
                PeerReply::Reply(Reply::Error(e)) => warn!("publish to {peer} failed: {e}"),
                _ => {}
            }
        }
        Reply::Integer(total)
    }

    /// `FLUSHDB`/`FLUSHALL`: broadcasts to every peer, which clears its
    /// own local database(s).
    pub async fn flush_all_peers(&self, db_indices: &[usize]) -> Reply {
        for peer in self.peers() {
            for &db_index in db_indices {
                let reply = self
                    .relay_exec(&peer, db_index, vec![Bytes::from_static(b"FLUSHDB")])
                    .await;
                if let Reply::Error(e) = reply {
                    return Reply::Error(format!("error occurs: {e}"));
                }
            }
        }
        Reply::ok()
    }

    fn peers(&self) -> &[String] {
        &self.known_peers
    }

    // ---- participant-side request handling -----------------------------

    pub async fn handle_request(&self, req: PeerRequest) -> PeerReply {
        match req {
            PeerRequest::Exec { db_index, cmd_line } => {
                PeerReply::Reply(self.db(db_index).exec_normal(&cmd_line).await)
            }
            PeerRequest::Prepare { db_index, tx_id, op } => {
                PeerReply::Prepared(self.handle_prepare(db_index, tx_id, op).await)
            }
            PeerRequest::Commit { db_index, tx_id, payload } => {
                PeerReply::Committed(self.handle_commit(db_index, tx_id, payload))
            }
            PeerRequest::Rollback { tx_id, .. } => {
                self.pending.remove(&tx_id);
                PeerReply::Reply(Reply::ok())
            }
            PeerRequest::Publish { db_index, channel, payload } => {
                let _ = db_index;
                let delivered = self.pubsub.publish(&channel, payload).await;
                PeerReply::Reply(Reply::Integer(delivered as i64))
            }
            PeerRequest::GetVer { db_index, key } => {
                PeerReply::Version(self.db(db_index).current_version(&key))
            }
            PeerRequest::RelayMulti { db_index, watching, queue } => {
                let watching: HashMap<Bytes, u32> = watching.into_iter().collect();
                PeerReply::Reply(self.db(db_index).exec_multi(watching, queue).await)
            }
        }
    }

    async fn handle_prepare(&self, db_index: usize, tx_id: i64, op: PrepareOp) -> Result<PrepareAck> {
        let db = self.db(db_index);
        match op {
            PrepareOp::Del { keys } => {
                let guard = db.lock_keys(&keys).await;
                self.pending.insert(tx_id, PendingTx { db_index, guard, op: PreparedOp::Del { keys } });
                Ok(PrepareAck::Del)
            }
            PrepareOp::RenameFrom { key } => {
                let guard = db.lock_keys(std::slice::from_ref(&key)).await;
                if !db.exists(&key) {
                    return Err(Error::NoSuchKey);
                }
                self.pending.insert(tx_id, PendingTx { db_index, guard, op: PreparedOp::RenameFrom { key } });
                Ok(PrepareAck::RenameFrom)
            }
            PrepareOp::RenameTo { key, check_absent } => {
                let guard = db.lock_keys(std::slice::from_ref(&key)).await;
                if check_absent && db.exists(&key) {
                    return Err(Error::KeyExists);
                }
                self.pending.insert(
                    tx_id,
                    PendingTx { db_index, guard, op: PreparedOp::RenameTo { key } },
                );
                Ok(PrepareAck::RenameTo)
            }
        }
    }

    /// The lock guard held since `Prepare` is dropped (releasing it) when
    /// the removed `PendingTx` goes out of scope at the end of this call.
    fn handle_commit(&self, _db_index: usize, tx_id: i64, payload: CommitPayload) -> Result<CommitAck> {
        let Some((_, pending)) = self.pending.remove(&tx_id) else {
            return Err(Error::Internal(format!("unknown transaction {tx_id}")));
        };
        let db = self.db(pending.db_index);
        match pending.op {
            PreparedOp::Del { keys } => {
                let mut count = 0i64;
                for key in &keys {
                    if db.remove_key(key) {
                        count += 1;
                    }
                }
                Ok(CommitAck::Del { count })
            }
            PreparedOp::RenameFrom { key } => match db.dump_key(&key) {
                Some((entry, ttl)) => Ok(CommitAck::RenameFrom { value: entry.data, ttl }),
                None => Err(Error::NoSuchKey),
            },
            PreparedOp::RenameTo { key, .. } => {
                let CommitPayload::RenameValue { value, ttl } = payload else {
                    return Err(Error::Internal("commit missing rename payload".to_string()));
                };
                db.set(key.clone(), value);
                match ttl {
                    Some(d) => db.expire_at(key, Instant::now() + d),
                    None => {
                        db.persist(&key);
                    }
                }
                Ok(CommitAck::RenameTo)
            }
        }
    }
}

const REPLICAS: usize = 4;
