//! Optional multi-node clustering layered on top of the single-process
//! engine: consistent-hash routing to peers (C11), a transaction id
//! allocator and peer RPC boundary, and the coordinator that drives
//! cross-node `DEL`/`RENAME`/`RENAMENX`/`MULTI`/`EXEC`/`PUBLISH` (C12).

pub mod coordinator;
pub mod idgen;
pub mod ring;
pub mod transport;

pub use coordinator::Coordinator;
pub use ring::ConsistentHashRing;
pub use transport::{ClusterTransport, InMemoryTransport, PeerReply, PeerRequest};
