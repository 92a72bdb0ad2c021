//! Hash commands (spec.md §6 "Hashes").
//!
//! `DataValue::Hash` wraps a [`ShardedDict`] (C1), whose own methods take
//! `&self` — its shards carry their own locks, so mutating a hash's
//! fields never needs `&mut Entry`, only `&DataValue`.

use bytes::Bytes;

use crate::command::flags::CommandFlags;
use crate::command::line::CommandLine;
use crate::command::registry::{CommandSpec, KeySpec};
use crate::db::database::Database;
use crate::error::Result;
use crate::reply::Reply;
use crate::storage::entry::DataValue;

use super::util::bulk_or_null;

fn read_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::read(vec![args[1].clone()]))
}

fn write_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::write(vec![args[1].clone()]))
}

fn even_field_pairs(args: &[Bytes]) -> Result<()> {
    if (args.len() - 2) % 2 != 0 {
        return Err(crate::error::Error::Syntax);
    }
    Ok(())
}

fn hset_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    even_field_pairs(args)?;
    let key = &args[1];
    if let Some(Err(e)) = db.peek(key, |v| v.as_hash().map(|_| ())) {
        return Err(e);
    }
    let added = db.write_or_insert(
        key.clone(),
        DataValue::new_hash,
        |entry| -> Result<usize> {
            let hash = entry.data.as_hash()?;
            let mut added = 0;
            for pair in args[2..].chunks(2) {
                if hash.put(pair[0].clone(), pair[1].clone()) == 1 {
                    added += 1;
                }
            }
            Ok(added)
        },
    )?;
    Ok(Reply::Integer(added as i64))
}

fn hset_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let key = &args[1];
    let mut plan = Vec::new();
    for pair in args[2..].chunks(2) {
        let field = &pair[0];
        let prior = db
            .peek(key, |v| v.as_hash().ok().and_then(|h| h.get(field)))
            .flatten();
        plan.push(match prior {
            Some(old) => vec![Bytes::from_static(b"HSET"), key.clone(), field.clone(), old],
            None => vec![Bytes::from_static(b"HDEL"), key.clone(), field.clone()],
        });
    }
    Some(plan)
}

fn hget_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let field = &args[2];
    match db.peek(key, |v| v.as_hash().map(|h| h.get(field))) {
        None => Ok(Reply::NullBulk),
        Some(Ok(value)) => Ok(bulk_or_null(value)),
        Some(Err(e)) => Err(e),
    }
}

fn hdel_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let removed = db.peek(key, |v| -> Result<usize> {
        let hash = v.as_hash()?;
        Ok(args[2..].iter().filter(|f| hash.remove(f) == 1).count())
    });
    let removed = match removed {
        None => return Ok(Reply::Integer(0)),
        Some(r) => r?,
    };
    if removed > 0 && db.peek(key, |v| v.as_hash().map(|h| h.is_empty())) == Some(Ok(true)) {
        db.remove_key(key);
    }
    Ok(Reply::Integer(removed as i64))
}

fn hdel_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let key = &args[1];
    let mut plan = Vec::new();
    for field in &args[2..] {
        let prior = db
            .peek(key, |v| v.as_hash().ok().and_then(|h| h.get(field)))
            .flatten();
        if let Some(old) = prior {
            plan.push(vec![Bytes::from_static(b"HSET"), key.clone(), field.clone(), old]);
        }
    }
    Some(plan)
}

fn hlen_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    match db.peek(&args[1], |v| v.as_hash().map(|h| h.len())) {
        None => Ok(Reply::Integer(0)),
        Some(Ok(n)) => Ok(Reply::Integer(n as i64)),
        Some(Err(e)) => Err(e),
    }
}

pub static SPECS: &[CommandSpec] = &[
    CommandSpec {
        name: "hset",
        arity: -4,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: hset_exec,
        undo: Some(hset_undo),
    },
    CommandSpec {
        name: "hget",
        arity: 3,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: hget_exec,
        undo: None,
    },
    CommandSpec {
        name: "hdel",
        arity: -3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: hdel_exec,
        undo: Some(hdel_undo),
    },
    CommandSpec {
        name: "hlen",
        arity: 2,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: hlen_exec,
        undo: None,
    },
];
