//! ridgekv: a sharded, in-memory key/value store with a Redis-compatible
//! command surface and optional multi-node clustering.
//!
//! The crate is organized bottom-up: [`storage`] holds the lock-free(ish)
//! data structures a single database is built from, [`db`] wires those into
//! a single logical database with transactions and TTL expiry, [`command`]
//! describes the command table every connection dispatches through, and
//! [`cluster`] layers consistent-hash routing and cross-node coordination
//! on top of a fleet of otherwise-independent servers.

pub mod cluster;
pub mod command;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod eviction;
pub mod pool;
pub mod pubsub;
pub mod reply;
pub mod server;
pub mod storage;

pub use db::Database;
pub use error::{Error, Result};
pub use reply::Reply;
pub use server::Server;
