//! Shared undo-plan helpers. spec.md §4.6 calls the whole-key-overwrite
//! strategy `RollbackFirstKey`: if the key didn't exist before the write,
//! compensate with `DEL key`; if it did, compensate by fully rebuilding
//! its prior contents. Field-level commands (HSET, ZADD) use a finer
//! compensation instead — see their own `undo` functions.

use bytes::Bytes;

use crate::command::line::CommandLine;
use crate::storage::entry::DataValue;

use super::database::Database;

/// Builds the command(s) that recreate `value` under `key` from nothing.
/// Shared by rollback (restoring a pre-write snapshot) and RDB load
/// (spec.md §6 "RDB load": "emits one equivalent AOF command" per event).
pub(crate) fn rebuild_commands(key: &Bytes, value: &DataValue) -> Vec<CommandLine> {
    match value {
        DataValue::String(b) => vec![vec![Bytes::from_static(b"SET"), key.clone(), b.clone()]],
        DataValue::List(list) => {
            if list.is_empty() {
                return Vec::new();
            }
            let mut cmd = vec![Bytes::from_static(b"RPUSH"), key.clone()];
            cmd.extend(list.iter().cloned());
            vec![cmd]
        }
        DataValue::Hash(hash) => {
            let mut cmd = vec![Bytes::from_static(b"HSET"), key.clone()];
            hash.for_each(|field, v| {
                cmd.push(field.clone());
                cmd.push(v.clone());
            });
            if cmd.len() <= 2 {
                return Vec::new();
            }
            vec![cmd]
        }
        DataValue::SortedSet(zset) => {
            let mut cmd = vec![Bytes::from_static(b"ZADD"), key.clone()];
            for (member, score) in zset.iter() {
                cmd.push(Bytes::from(format_score(score)));
                cmd.push(member.clone());
            }
            if cmd.len() <= 2 {
                return Vec::new();
            }
            vec![cmd]
        }
    }
}

pub fn format_score(score: f64) -> String {
    if score == score.trunc() && score.is_finite() {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}

/// `RollbackFirstKey`: a whole-key snapshot/restore plan for `key`, read
/// *before* the command that is about to overwrite or delete it runs.
/// Captures the key's prior TTL alongside its value so a rolled-back
/// write leaves the key's expiration byte-identical to the pre-MULTI
/// state too (P6), not just its contents.
pub fn rollback_first_key(db: &Database, key: &Bytes) -> Vec<CommandLine> {
    let existed = db.peek(key, |v| rebuild_commands(key, v));
    match existed {
        Some(mut rebuild) => {
            let mut out = vec![vec![Bytes::from_static(b"DEL"), key.clone()]];
            out.append(&mut rebuild);
            if let Some(remaining) = db.ttl_remaining(key) {
                out.push(vec![
                    Bytes::from_static(b"PEXPIRE"),
                    key.clone(),
                    Bytes::from(remaining.as_millis().max(1).to_string()),
                ]);
            }
            out
        }
        None => vec![vec![Bytes::from_static(b"DEL"), key.clone()]],
    }
}
