//! The boundary an (out-of-scope) RDB snapshot loader plugs into
//! (spec.md §6 "RDB load"): "an external decoder emits (db-index, key,
//! type, value, expiration?) events; for each event the core creates a
//! DB entry, sets TTL if present, and emits one equivalent AOF command."
//!
//! The decoder that reads the on-disk RDB format is out of scope per §1;
//! this module is only the seam it hands decoded entries through.

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::command::line::CommandLine;
use crate::storage::entry::DataValue;

use super::database::Database;
use super::undo::rebuild_commands;

/// One decoded entry from an RDB snapshot: which database it belongs to,
/// its key and value, and its remaining time-to-live at load time (if
/// any). The loader is responsible for converting an absolute on-disk
/// expiration timestamp into a `Duration` relative to "now" before
/// constructing this — the core only ever reasons in terms of its own
/// `Instant` clock (matching [`Database::expire_at`]).
pub struct RdbLoadEvent {
    pub db_index: usize,
    pub key: Bytes,
    pub value: DataValue,
    pub expire_in: Option<Duration>,
}

impl Database {
    /// Applies one [`RdbLoadEvent`] already routed to this database
    /// (`db_index` has already been used to pick `self` out of the
    /// server's DB array): creates the entry, schedules its TTL if
    /// present, and returns the equivalent AOF command(s) the caller
    /// should append to the replay log — the core doesn't write AOF
    /// records on its own for a load event (there's no "successful
    /// write command" to hang `AofSink::record` off of, since nothing
    /// came in over the wire), so the loader applies the returned lines
    /// through its own AOF sink.
    pub fn load_entry(&self, key: Bytes, value: DataValue, expire_in: Option<Duration>) -> Vec<CommandLine> {
        let mut lines = rebuild_commands(&key, &value);
        self.set(key.clone(), value);
        if let Some(ttl) = expire_in {
            let at = Instant::now() + ttl;
            self.expire_at(key.clone(), at);
            lines.push(vec![
                Bytes::from_static(b"PEXPIREAT"),
                key,
                Bytes::from(millis_from_now(ttl)),
            ]);
        }
        lines
    }
}

fn millis_from_now(ttl: Duration) -> String {
    ttl.as_millis().to_string()
}
