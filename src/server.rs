//! C7: the multi-database server. Holds the fixed array of DBs a
//! connection selects among, dispatches the handful of commands that
//! aren't scoped to a single database (AUTH, PING, SELECT, FLUSHALL,
//! SUBSCRIBE/UNSUBSCRIBE, PUBLISH — spec.md §4.7), and otherwise hands
//! the command line to the connection's current DB.
//!
//! In cluster mode (spec.md §4.12) this layer also intercepts the
//! handful of commands the coordinator needs to see before a DB ever
//! does: `WATCH` (may need a `GetVer` round-trip for a non-owned key),
//! `EXEC` (a cross-node transaction must route as one relayed unit, not
//! per-command), and `DEL`/`RENAME`/`RENAMENX` outside of MULTI (may
//! span peers and need the two-phase protocol). Everything else —
//! ordinary commands, and anything queued inside MULTI — still goes
//! through [`Database::exec`] unmodified, reusing its single-process
//! dispatch rather than duplicating it.

use std::sync::Arc;

use bytes::Bytes;

use crate::cluster::{ClusterTransport, Coordinator};
use crate::command::line::CommandLine;
use crate::command::registry;
use crate::config::Config;
use crate::connection::ConnectionState;
use crate::db::aof::AofSink;
use crate::db::rdb::RdbLoadEvent;
use crate::db::Database;
use crate::error::Error;
use crate::eviction::EvictionEngine;
use crate::pubsub::{PubSubHub, PubSubMessage, SharedPubSubHub};
use crate::reply::Reply;
use crate::storage::time_wheel::TimeWheel;

/// A freshly registered connection: its initial state (already bound to
/// a pub/sub subscriber id) plus the receiving end of its message
/// channel. The out-of-scope TCP connection loop owns forwarding
/// `messages` to the client socket (spec.md §1).
pub struct NewConnection {
    pub state: ConnectionState,
    pub messages: tokio::sync::mpsc::Receiver<PubSubMessage>,
}

pub struct Server {
    config: Config,
    dbs: Arc<[Database]>,
    pubsub: SharedPubSubHub,
    coordinator: Option<Arc<Coordinator>>,
    aof: Option<Arc<dyn AofSink>>,
}

impl Server {
    /// Builds the DB array (sharing one time wheel so TTL expirations
    /// don't spawn a background driver per database), the pub/sub hub,
    /// and — if `config.cluster_enabled()` — the coordinator, wired to
    /// `transport`. A cluster-enabled config with no transport is a
    /// caller error: the crate defines the `ClusterTransport` boundary
    /// but does not implement a real peer RPC codec (spec.md §1, §4.12).
    pub fn new(
        config: Config,
        aof: Option<Arc<dyn AofSink>>,
        transport: Option<Arc<dyn ClusterTransport>>,
    ) -> crate::error::Result<Self> {
        let time_wheel = TimeWheel::new();
        let dbs: Arc<[Database]> = (0..config.databases)
            .map(|i| Database::new(i, time_wheel.clone(), aof.clone()))
            .collect::<Vec<_>>()
            .into();
        let pubsub: SharedPubSubHub = Arc::new(PubSubHub::new());

        let coordinator = if config.cluster_enabled() {
            let cluster = config.cluster.as_ref().expect("cluster_enabled implies cluster config");
            let Some(transport) = transport else {
                return Err(Error::Config(
                    "cluster mode requires a ClusterTransport".to_string(),
                ));
            };
            Some(Arc::new(Coordinator::new(
                cluster.self_id.clone(),
                &cluster.peers,
                dbs.clone(),
                pubsub.clone(),
                transport,
            )))
        } else {
            None
        };

        Ok(Self {
            config,
            dbs,
            pubsub,
            coordinator,
            aof,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db_count(&self) -> usize {
        self.dbs.len()
    }

    pub fn coordinator(&self) -> Option<&Arc<Coordinator>> {
        self.coordinator.as_ref()
    }

    /// Applies one event from an (out-of-scope) RDB snapshot loader
    /// (spec.md §6 "RDB load"): routes it to the right database by
    /// `db_index`, creates the entry and TTL, and forwards the
    /// equivalent AOF command(s) to the configured sink. The caller is
    /// responsible for the `db-index` bookkeeping a real AOF writer does
    /// across a whole snapshot load (spec.md §6 "AOF record": "a `SELECT
    /// <db>` when the target DB changes") — each `record` call here is
    /// scoped to this event's own `db_index` independent of the last one.
    pub fn load_rdb_event(&self, event: RdbLoadEvent) {
        let db = &self.dbs[event.db_index];
        let lines = db.load_entry(event.key, event.value, event.expire_in);
        if let Some(aof) = &self.aof {
            for line in &lines {
                aof.record(event.db_index, line);
            }
        }
    }

    fn db(&self, conn: &ConnectionState) -> &Database {
        &self.dbs[conn.db_index]
    }

    /// Registers a new connection with the pub/sub hub and hands back
    /// its initial state plus message receiver. The (out-of-scope)
    /// connection loop calls this once per accepted socket.
    pub fn new_connection(&self) -> NewConnection {
        let (id, messages) = self.pubsub.register();
        let mut state = ConnectionState::new();
        state.subscriber_id = Some(id);
        NewConnection { state, messages }
    }

    /// Cleans up a connection's pub/sub membership on close. Any MULTI
    /// state is simply dropped along with `conn` itself (spec.md §5).
    pub async fn disconnect(&self, conn: &ConnectionState) {
        if let Some(id) = conn.subscriber_id {
            self.pubsub.deregister(id).await;
        }
    }

    /// Spawns the eviction engine (C8) as a background task, returning
    /// its join handle. A no-op loop if `maxmemory` isn't configured
    /// (see [`EvictionEngine::run`]).
    pub fn spawn_eviction(
        &self,
        shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let engine = EvictionEngine::new(self.dbs.clone(), self.config.maxmemory_policy, self.config.maxmemory);
        tokio::spawn(engine.run(shutdown))
    }

    /// The top-level entry point every accepted command goes through
    /// (spec.md §4.7). Enforces AUTH, dispatches server-scoped commands,
    /// applies cluster interception where needed, and otherwise
    /// delegates to the connection's current database.
    pub async fn exec(&self, conn: &mut ConnectionState, cmd_line: &CommandLine) -> Reply {
        if cmd_line.is_empty() {
            return Error::UnknownCommand(String::new()).into();
        }
        let name = cmd_line[0].to_ascii_uppercase();

        if self.config.auth_required() && !conn.authenticated && name != b"AUTH" {
            return Error::NoAuth.into();
        }

        match name.as_slice() {
            b"AUTH" => self.handle_auth(conn, cmd_line),
            b"PING" => Self::handle_ping(cmd_line),
            b"SELECT" => self.handle_select(conn, cmd_line),
            b"FLUSHALL" => self.handle_flushall(cmd_line).await,
            b"SUBSCRIBE" => self.handle_subscribe(conn, &cmd_line[1..]).await,
            b"UNSUBSCRIBE" => self.handle_unsubscribe(conn, &cmd_line[1..]).await,
            b"PUBLISH" => self.handle_publish(conn, cmd_line).await,
            b"WATCH" if self.coordinator.is_some() => self.cluster_watch(conn, &cmd_line[1..]).await,
            b"EXEC" if self.coordinator.is_some() => self.cluster_exec(conn).await,
            b"DEL" | b"RENAME" | b"RENAMENX" if self.coordinator.is_some() && !conn.in_multi => {
                self.cluster_route(conn, name.as_slice(), cmd_line).await
            }
            _ if self.coordinator.is_some() && !conn.in_multi => {
                self.cluster_dispatch(conn, cmd_line).await
            }
            _ => self.db(conn).exec(conn, cmd_line).await,
        }
    }

    /// The default, not-otherwise-intercepted path in cluster mode: an
    /// ordinary keyed command (`GET`/`SET`/`INCR`/…) must run on whichever
    /// peer owns its key(s), not wherever it happened to be received
    /// (spec.md §4.12 "Fast path"). Commands the registry doesn't know
    /// (`MULTI`/`DISCARD`/`UNWATCH`, or anything with a bad arity/syntax)
    /// and commands with no keys at all (`FLUSHDB`) fall straight through
    /// to the local database unchanged, since there's nothing to route by.
    async fn cluster_dispatch(&self, conn: &mut ConnectionState, cmd_line: &CommandLine) -> Reply {
        if let Some(spec) = registry::lookup(&cmd_line[0])
            && spec.validate_arity(cmd_line.len()).is_ok()
            && let Ok(key_spec) = (spec.prepare)(cmd_line)
        {
            let keys: Vec<Bytes> = key_spec.all_keys().cloned().collect();
            if !keys.is_empty() {
                let coordinator =
                    self.coordinator.as_ref().expect("cluster_dispatch requires a coordinator");
                return coordinator.route_keyed(conn.db_index, &keys, cmd_line.clone()).await;
            }
        }
        self.db(conn).exec(conn, cmd_line).await
    }

    // ---- system commands (spec.md §4.7) ------------------------------

    fn handle_auth(&self, conn: &mut ConnectionState, cmd_line: &CommandLine) -> Reply {
        if cmd_line.len() != 2 {
            return Error::WrongNumArgs("auth".to_string()).into();
        }
        match &self.config.requirepass {
            Some(pass) if !pass.is_empty() => {
                if cmd_line[1].as_ref() == pass.as_bytes() {
                    conn.authenticated = true;
                    Reply::ok()
                } else {
                    Error::InvalidPassword.into()
                }
            }
            _ => Error::Internal(
                "Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?"
                    .to_string(),
            )
            .into(),
        }
    }

    fn handle_ping(cmd_line: &CommandLine) -> Reply {
        match cmd_line.len() {
            1 => Reply::SimpleString("PONG"),
            2 => Reply::Bulk(cmd_line[1].clone()),
            _ => Error::WrongNumArgs("ping".to_string()).into(),
        }
    }

    fn handle_select(&self, conn: &mut ConnectionState, cmd_line: &CommandLine) -> Reply {
        if cmd_line.len() != 2 {
            return Error::WrongNumArgs("select".to_string()).into();
        }
        let Some(index) = std::str::from_utf8(&cmd_line[1])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
        else {
            return Error::OutOfRange.into();
        };
        if index < 0 || index as usize >= self.dbs.len() {
            return Error::OutOfRange.into();
        }
        conn.db_index = index as usize;
        Reply::ok()
    }

    /// Clears every database, locally (cluster peers clear their own
    /// copy independently via [`Coordinator::flush_all_peers`], which
    /// the out-of-scope system-command layer calls separately when it
    /// wants a cluster-wide flush).
    async fn handle_flushall(&self, cmd_line: &CommandLine) -> Reply {
        if cmd_line.len() != 1 {
            return Error::WrongNumArgs("flushall".to_string()).into();
        }
        for db in self.dbs.iter() {
            db.clear();
        }
        if let Some(aof) = &self.aof {
            aof.record(0, &vec![Bytes::from_static(b"FLUSHALL")]);
        }
        Reply::ok()
    }

    // ---- pub/sub (spec.md §4.9) --------------------------------------

    async fn handle_subscribe(&self, conn: &mut ConnectionState, channels: &[Bytes]) -> Reply {
        if channels.is_empty() {
            return Error::WrongNumArgs("subscribe".to_string()).into();
        }
        let Some(id) = conn.subscriber_id else {
            return Error::Internal("connection is not registered for pub/sub".to_string()).into();
        };
        let results = self.pubsub.subscribe(id, channels).await;
        for (channel, _) in &results {
            conn.subscribed_channels.insert(channel.clone());
        }
        Reply::Array(
            results
                .into_iter()
                .map(|(channel, count)| {
                    Reply::Array(vec![
                        Reply::bulk(&b"subscribe"[..]),
                        Reply::Bulk(channel),
                        Reply::Integer(count as i64),
                    ])
                })
                .collect(),
        )
    }

    /// An empty channel list unsubscribes from everything (spec.md
    /// §4.9's "Unsubscribe(conn, channels…|all)").
    async fn handle_unsubscribe(&self, conn: &mut ConnectionState, channels: &[Bytes]) -> Reply {
        let Some(id) = conn.subscriber_id else {
            return Reply::Array(Vec::new());
        };
        let results = if channels.is_empty() {
            self.pubsub.unsubscribe_all(id).await
        } else {
            self.pubsub.unsubscribe(id, channels).await
        };
        for (channel, _) in &results {
            conn.subscribed_channels.remove(channel);
        }
        Reply::Array(
            results
                .into_iter()
                .map(|(channel, count)| {
                    Reply::Array(vec![
                        Reply::bulk(&b"unsubscribe"[..]),
                        Reply::Bulk(channel),
                        Reply::Integer(count as i64),
                    ])
                })
                .collect(),
        )
    }

    async fn handle_publish(&self, conn: &ConnectionState, cmd_line: &CommandLine) -> Reply {
        if cmd_line.len() != 3 {
            return Error::WrongNumArgs("publish".to_string()).into();
        }
        let channel = cmd_line[1].clone();
        let payload = cmd_line[2].clone();
        match &self.coordinator {
            Some(coordinator) => coordinator.publish(conn.db_index, channel, payload).await,
            None => Reply::Integer(self.pubsub.publish(&channel, payload).await as i64),
        }
    }

    // ---- cluster interception (spec.md §4.12) ------------------------

    /// `WATCH` under cluster mode: a key this node doesn't own needs its
    /// version fetched from the owning peer (`GetVer`) rather than read
    /// from a local map that was never written to (spec.md's
    /// supplemented `GetVer` flow, SPEC_FULL.md §3).
    async fn cluster_watch(&self, conn: &mut ConnectionState, keys: &[Bytes]) -> Reply {
        if conn.in_multi {
            return Error::NotAllowedInMulti("WATCH".to_string()).into();
        }
        if keys.is_empty() {
            return Error::WrongNumArgs("watch".to_string()).into();
        }
        let coordinator = self.coordinator.as_ref().expect("cluster_watch requires a coordinator");
        let db = self.db(conn);
        for key in keys {
            let version = if coordinator.owns(key) {
                db.check_expired(key);
                db.current_version(key)
            } else {
                coordinator.get_version(conn.db_index, key).await
            };
            conn.watch(key.clone(), version);
        }
        Reply::ok()
    }

    /// `EXEC` under cluster mode: drains the queue exactly as the
    /// single-process engine does, but hands the transaction to the
    /// coordinator instead of running it in-process, so a transaction
    /// spanning exactly one peer's slot still commits remotely.
    async fn cluster_exec(&self, conn: &mut ConnectionState) -> Reply {
        let coordinator = self.coordinator.as_ref().expect("cluster_exec requires a coordinator");
        let db_index = conn.db_index;
        match self.db(conn).take_exec_payload(conn) {
            Err(reply) => reply,
            Ok((watching, queue)) => coordinator.exec_multi(db_index, watching, queue).await,
        }
    }

    /// `DEL`/`RENAME`/`RENAMENX` outside of MULTI: the coordinator
    /// already implements the fast-path/two-phase split (spec.md §4.12);
    /// this only validates arity against the registry first, since the
    /// coordinator's own methods don't re-check it.
    async fn cluster_route(&self, conn: &ConnectionState, name: &[u8], cmd_line: &CommandLine) -> Reply {
        let Some(spec) = registry::lookup(name) else {
            return Error::UnknownCommand(String::from_utf8_lossy(name).to_string()).into();
        };
        if let Err(e) = spec.validate_arity(cmd_line.len()) {
            return e.into();
        }
        let coordinator = self.coordinator.as_ref().expect("cluster_route requires a coordinator");
        match name {
            b"DEL" => coordinator.del(conn.db_index, cmd_line[1..].to_vec()).await,
            b"RENAME" => {
                coordinator
                    .rename(conn.db_index, cmd_line[1].clone(), cmd_line[2].clone())
                    .await
            }
            b"RENAMENX" => {
                coordinator
                    .renamenx(conn.db_index, cmd_line[1].clone(), cmd_line[2].clone())
                    .await
            }
            _ => unreachable!("cluster_route only dispatches DEL/RENAME/RENAMENX"),
        }
    }
}
