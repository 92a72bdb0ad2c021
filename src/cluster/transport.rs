//! The coordinator's peer RPC boundary (spec.md §4.12's closing note on
//! relay encoding). `spineldb`'s `ClusterClient`
//! (`src/core/cluster/client.rs`) wraps a `TcpStream` + frame codec for
//! its own orchestration commands; a real deployment of this crate would
//! plug a RESP-over-TCP client in here the same way, using the
//! connection pool (C10) to bound concurrency per peer. The byte-level
//! codec is out of scope (§1), so this module only defines the request/
//! reply shape and an in-process test double.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

use crate::command::line::CommandLine;
use crate::error::Error;
use crate::reply::Reply;
use crate::storage::entry::DataValue;

use super::coordinator::Coordinator;

/// What the coordinator asks a peer (possibly itself) to do.
pub enum PeerRequest {
    /// Fast-path: run a command against one of the peer's databases.
    Exec { db_index: usize, cmd_line: CommandLine },
    Prepare { db_index: usize, tx_id: i64, op: PrepareOp },
    Commit { db_index: usize, tx_id: i64, payload: CommitPayload },
    Rollback { db_index: usize, tx_id: i64 },
    /// `_publish`: deliver to the peer's local subscribers only.
    Publish { db_index: usize, channel: Bytes, payload: Bytes },
    /// `GetVer`: a non-owning node asking the owning peer for a key's
    /// current WATCH version (spec.md §4.12 "Cross-node MULTI/EXEC").
    GetVer { db_index: usize, key: Bytes },
    /// `_multi`: relays an entire MULTI/EXEC transaction whose keys all
    /// route to one peer. Stands in for spec.md §4.12's base64-over-RESP
    /// relay encoding, which belongs to the out-of-scope wire codec (§1);
    /// this is the same hand-off one level up, as a structured value.
    RelayMulti {
        db_index: usize,
        watching: Vec<(Bytes, u32)>,
        queue: Vec<CommandLine>,
    },
}

pub enum PrepareOp {
    Del { keys: Vec<Bytes> },
    RenameFrom { key: Bytes },
    RenameTo { key: Bytes, check_absent: bool },
}

pub enum CommitPayload {
    None,
    /// Carries the value dumped by the `RenameFrom` participant's own
    /// commit step across to the `RenameTo` participant's commit step.
    RenameValue {
        value: DataValue,
        ttl: Option<Duration>,
    },
}

pub enum PrepareAck {
    Del,
    RenameFrom,
    RenameTo,
}

pub enum CommitAck {
    Del { count: i64 },
    RenameFrom { value: DataValue, ttl: Option<Duration> },
    RenameTo,
}

pub enum PeerReply {
    Reply(Reply),
    Prepared(Result<PrepareAck, Error>),
    Committed(Result<CommitAck, Error>),
    Version(u32),
}

#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn dispatch(&self, peer: &str, req: PeerRequest) -> PeerReply;
}

/// An in-process transport wiring several [`Coordinator`]s together,
/// standing in for a real RESP-over-TCP client during tests. Nodes are
/// registered after construction so coordinators can be built first and
/// handed `Arc<InMemoryTransport>` before their peers exist.
#[derive(Default)]
pub struct InMemoryTransport {
    nodes: DashMap<String, Arc<Coordinator>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self { nodes: DashMap::new() }
    }

    pub fn register(&self, peer: impl Into<String>, coordinator: Arc<Coordinator>) {
        self.nodes.insert(peer.into(), coordinator);
    }
}

#[async_trait]
impl ClusterTransport for InMemoryTransport {
    async fn dispatch(&self, peer: &str, req: PeerRequest) -> PeerReply {
        match self.nodes.get(peer) {
            Some(node) => node.handle_request(req).await,
            None => PeerReply::Reply(Reply::from(Error::ClusterPeer(format!(
                "unknown peer '{peer}'"
            )))),
        }
    }
}
