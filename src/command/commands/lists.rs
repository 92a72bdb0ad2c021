//! List commands (spec.md §6 "Lists").

use bytes::Bytes;

use crate::command::flags::CommandFlags;
use crate::command::line::CommandLine;
use crate::command::registry::{CommandSpec, KeySpec};
use crate::db::database::Database;
use crate::error::Result;
use crate::reply::Reply;
use crate::storage::entry::DataValue;

use super::util::parse_i64;

fn read_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::read(vec![args[1].clone()]))
}

fn write_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::write(vec![args[1].clone()]))
}

fn push_front_all(db: &Database, key: &Bytes, values: &[Bytes]) -> usize {
    db.write_or_insert(
        key.clone(),
        || DataValue::List(crate::storage::list::List::new()),
        |entry| {
            let list = entry.data.as_list_mut().expect("checked by caller");
            for v in values {
                list.push_front(v.clone());
            }
            list.len()
        },
    )
}

fn push_back_all(db: &Database, key: &Bytes, values: &[Bytes]) -> usize {
    db.write_or_insert(
        key.clone(),
        || DataValue::List(crate::storage::list::List::new()),
        |entry| {
            let list = entry.data.as_list_mut().expect("checked by caller");
            for v in values {
                list.push_back(v.clone());
            }
            list.len()
        },
    )
}

fn lpush_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    // A pre-existing wrong-type value must surface as an error, not be
    // silently overwritten by `write_or_insert`'s default.
    if let Some(Err(e)) = db.peek(key, |v| v.as_list().map(|_| ())) {
        return Err(e);
    }
    let len = push_front_all(db, key, &args[2..]);
    Ok(Reply::Integer(len as i64))
}

fn rpush_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    if let Some(Err(e)) = db.peek(key, |v| v.as_list().map(|_| ())) {
        return Err(e);
    }
    let len = push_back_all(db, key, &args[2..]);
    Ok(Reply::Integer(len as i64))
}

fn lpush_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let _ = db;
    let n = args.len() - 2;
    Some((0..n).map(|_| vec![Bytes::from_static(b"LPOP"), args[1].clone()]).collect())
}

fn rpush_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let _ = db;
    let n = args.len() - 2;
    Some((0..n).map(|_| vec![Bytes::from_static(b"RPOP"), args[1].clone()]).collect())
}

fn pop_one(db: &Database, key: &Bytes, from_front: bool) -> Result<Option<Bytes>> {
    let popped = db.write(key, |entry| -> Result<Option<Bytes>> {
        let list = entry.data.as_list_mut()?;
        Ok(if from_front { list.pop_front() } else { list.pop_back() })
    });
    let popped = match popped {
        None => return Ok(None),
        Some(r) => r?,
    };
    if popped.is_some() && db.peek(key, |v| v.as_list().map(|l| l.is_empty())) == Some(Ok(true)) {
        db.remove_key(key);
    }
    Ok(popped)
}

fn lpop_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    Ok(match pop_one(db, &args[1], true)? {
        Some(b) => Reply::Bulk(b),
        None => Reply::NullBulk,
    })
}

fn rpop_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    Ok(match pop_one(db, &args[1], false)? {
        Some(b) => Reply::Bulk(b),
        None => Reply::NullBulk,
    })
}

fn lpop_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let value = db.peek(&args[1], |v| v.as_list().ok().and_then(|l| l.get(0)));
    match value.flatten() {
        Some(b) => Some(vec![vec![Bytes::from_static(b"LPUSH"), args[1].clone(), b]]),
        None => Some(Vec::new()),
    }
}

fn rpop_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let value = db.peek(&args[1], |v| v.as_list().ok().and_then(|l| l.get(-1)));
    match value.flatten() {
        Some(b) => Some(vec![vec![Bytes::from_static(b"RPUSH"), args[1].clone(), b]]),
        None => Some(Vec::new()),
    }
}

fn llen_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let len = db.peek(&args[1], |v| v.as_list().map(|l| l.len()));
    match len {
        None => Ok(Reply::Integer(0)),
        Some(Ok(n)) => Ok(Reply::Integer(n as i64)),
        Some(Err(e)) => Err(e),
    }
}

fn lindex_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let index = parse_i64(&args[2])?;
    let value = db.peek(&args[1], |v| v.as_list().map(|l| l.get(index)));
    match value {
        None => Ok(Reply::NullBulk),
        Some(Ok(Some(b))) => Ok(Reply::Bulk(b)),
        Some(Ok(None)) => Ok(Reply::NullBulk),
        Some(Err(e)) => Err(e),
    }
}

fn lrange_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let start = parse_i64(&args[2])?;
    let stop = parse_i64(&args[3])?;
    let values = db.peek(&args[1], |v| v.as_list().map(|l| l.range(start, stop)));
    match values {
        None => Ok(Reply::Array(Vec::new())),
        Some(Ok(items)) => Ok(Reply::Array(items.into_iter().map(Reply::Bulk).collect())),
        Some(Err(e)) => Err(e),
    }
}

pub static SPECS: &[CommandSpec] = &[
    CommandSpec {
        name: "lpush",
        arity: -3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: lpush_exec,
        undo: Some(lpush_undo),
    },
    CommandSpec {
        name: "rpush",
        arity: -3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: rpush_exec,
        undo: Some(rpush_undo),
    },
    CommandSpec {
        name: "lpop",
        arity: 2,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: lpop_exec,
        undo: Some(lpop_undo),
    },
    CommandSpec {
        name: "rpop",
        arity: 2,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: rpop_exec,
        undo: Some(rpop_undo),
    },
    CommandSpec {
        name: "llen",
        arity: 2,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: llen_exec,
        undo: None,
    },
    CommandSpec {
        name: "lindex",
        arity: 3,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: lindex_exec,
        undo: None,
    },
    CommandSpec {
        name: "lrange",
        arity: 4,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: lrange_exec,
        undo: None,
    },
];
