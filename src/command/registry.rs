//! C5: the process-wide command table. Built once, lazily, on first
//! lookup (`std::sync::OnceLock`) and never mutated afterwards — reads
//! are lock-free, matching spec.md §4.5 ("registration is performed at
//! startup ... subsequent reads are lock-free").

use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::Bytes;

use crate::command::flags::CommandFlags;
use crate::command::line::CommandLine;
use crate::db::database::Database;
use crate::error::{Error, Result};
use crate::reply::Reply;

/// The write/read key sets a command's `prepare` step resolves, handed to
/// `StripedLock::rw_locks` before the command actually runs.
#[derive(Debug, Default, Clone)]
pub struct KeySpec {
    pub write_keys: Vec<Bytes>,
    pub read_keys: Vec<Bytes>,
}

impl KeySpec {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn write(keys: Vec<Bytes>) -> Self {
        Self {
            write_keys: keys,
            read_keys: Vec::new(),
        }
    }

    pub fn read(keys: Vec<Bytes>) -> Self {
        Self {
            write_keys: Vec::new(),
            read_keys: keys,
        }
    }

    /// All keys, write and read, deduplication is the caller's job (the
    /// striped lock already dedups by stripe index).
    pub fn all_keys(&self) -> impl Iterator<Item = &Bytes> {
        self.write_keys.iter().chain(self.read_keys.iter())
    }
}

pub type PrepareFn = fn(&[Bytes]) -> Result<KeySpec>;
pub type ExecuteFn = fn(&Database, &[Bytes]) -> Result<Reply>;
/// Computes the compensating command lines for a write, observing
/// pre-execution state. Called *before* `execute`, under the same locks.
pub type UndoFn = fn(&Database, &[Bytes]) -> Option<Vec<CommandLine>>;

#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Positive = exact argument count (including the command name itself);
    /// negative = minimum |arity|.
    pub arity: i32,
    pub flags: CommandFlags,
    pub prepare: PrepareFn,
    pub execute: ExecuteFn,
    pub undo: Option<UndoFn>,
}

impl CommandSpec {
    pub fn validate_arity(&self, argc: usize) -> Result<()> {
        let argc = argc as i32;
        let ok = if self.arity >= 0 {
            argc == self.arity
        } else {
            argc >= -self.arity
        };
        if ok {
            Ok(())
        } else {
            Err(Error::WrongNumArgs(self.name.to_string()))
        }
    }

    pub fn is_write(&self) -> bool {
        self.flags.contains(CommandFlags::WRITE)
    }
}

static REGISTRY: OnceLock<HashMap<&'static str, CommandSpec>> = OnceLock::new();

fn all_families() -> impl Iterator<Item = &'static CommandSpec> {
    use crate::command::commands::*;
    strings::SPECS
        .iter()
        .chain(lists::SPECS.iter())
        .chain(hashes::SPECS.iter())
        .chain(zsets::SPECS.iter())
        .chain(keys::SPECS.iter())
}

fn build() -> HashMap<&'static str, CommandSpec> {
    let mut table = HashMap::new();
    for spec in all_families() {
        table.insert(spec.name, *spec);
    }
    table
}

pub fn registry() -> &'static HashMap<&'static str, CommandSpec> {
    REGISTRY.get_or_init(build)
}

/// Case-insensitive lookup; the wire protocol treats command names as
/// case-insensitive while every other argument byte stays binary-safe.
/// `CommandSpec` is `Copy` (all fields are `'static` references or fn
/// pointers), so this hands back an owned value rather than a borrow of
/// the registry.
pub fn lookup(name: &[u8]) -> Option<CommandSpec> {
    let lower = name.to_ascii_lowercase();
    let lower = std::str::from_utf8(&lower).ok()?;
    registry().get(lower).copied()
}

pub fn exists(name: &[u8]) -> bool {
    lookup(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup(b"GET").is_some());
        assert!(lookup(b"get").is_some());
        assert!(lookup(b"GeT").is_some());
    }

    #[test]
    fn unknown_command_is_none() {
        assert!(lookup(b"NOSUCHCOMMAND").is_none());
    }

    #[test]
    fn arity_validation() {
        let spec = lookup(b"get").unwrap();
        assert!(spec.validate_arity(2).is_ok());
        assert!(spec.validate_arity(1).is_err());
        let spec = lookup(b"mget").unwrap();
        assert!(spec.validate_arity(2).is_ok());
        assert!(spec.validate_arity(5).is_ok());
        assert!(spec.validate_arity(1).is_err());
    }
}
