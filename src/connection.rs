//! Per-connection state the engine tracks across commands: the
//! authentication gate, the selected DB index, MULTI/WATCH transaction
//! state, and the subscribed-channel set. The TCP socket and RESP codec
//! that actually own a connection are out of scope (§1); this struct is
//! the state those collaborators hand back into the core on each command.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::command::line::CommandLine;
use crate::pubsub::SubscriberId;

/// A queued command inside a MULTI block, paired with whatever the
/// queue-time validation already found wrong with it (arity/unknown-name
/// errors are recorded immediately so EXEC can `EXECABORT` without
/// re-validating).
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub line: CommandLine,
}

#[derive(Default)]
pub struct ConnectionState {
    pub authenticated: bool,
    pub db_index: usize,
    pub in_multi: bool,
    pub queue: Vec<QueuedCommand>,
    /// Set the moment a queue-time error (unknown command / bad arity) is
    /// seen; forces EXEC to return `EXECABORT` without running anything.
    pub multi_has_error: bool,
    pub watched: HashMap<Bytes, u32>,
    pub subscribed_channels: HashSet<Bytes>,
    /// Bound when the server registers this connection, so publishes
    /// can always reach it without a lazy-registration race; `None`
    /// only until the server layer assigns it (spec.md §4.9).
    pub subscriber_id: Option<SubscriberId>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_multi(&mut self) {
        self.in_multi = true;
        self.queue.clear();
        self.multi_has_error = false;
    }

    pub fn discard_multi(&mut self) {
        self.in_multi = false;
        self.queue.clear();
        self.multi_has_error = false;
    }

    pub fn watch(&mut self, key: Bytes, version: u32) {
        self.watched.insert(key, version);
    }

    pub fn unwatch(&mut self) {
        self.watched.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_multi_resets_queue_and_error_flag() {
        let mut conn = ConnectionState::new();
        conn.queue.push(QueuedCommand {
            line: vec![Bytes::from_static(b"GET")],
        });
        conn.multi_has_error = true;
        conn.start_multi();
        assert!(conn.queue.is_empty());
        assert!(!conn.multi_has_error);
        assert!(conn.in_multi);
    }
}
