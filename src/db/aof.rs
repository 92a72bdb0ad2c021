//! The boundary the (out-of-scope) append-only-file writer plugs into.
//! `exec_normal`/`exec_multi` call `AofSink::record` for every successful
//! write; the sink is responsible for the `SELECT <db>` prefix when the
//! target DB changes and for the actual file I/O, none of which is this
//! crate's concern (§1, §6 "AOF record").

use crate::command::line::CommandLine;

pub trait AofSink: Send + Sync {
    fn record(&self, db_index: usize, cmd_line: &CommandLine);
}

/// A sink that drops every record; the default when `appendonly` is off.
pub struct NullAofSink;

impl AofSink for NullAofSink {
    fn record(&self, _db_index: usize, _cmd_line: &CommandLine) {}
}
