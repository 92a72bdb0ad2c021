//! String and bitmap commands (spec.md §6 "Strings").

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::command::flags::CommandFlags;
use crate::command::line::CommandLine;
use crate::command::registry::{CommandSpec, KeySpec};
use crate::db::database::Database;
use crate::db::undo::rollback_first_key;
use crate::error::{Error, Result};
use crate::reply::Reply;
use crate::storage::bitmap::Bitmap;
use crate::storage::decimal::Decimal;
use crate::storage::entry::DataValue;

use super::util::{bulk_or_null, eq_ignore_case, parse_i64};

fn read_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::read(vec![args[1].clone()]))
}

fn write_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::write(vec![args[1].clone()]))
}

fn string_of(db: &Database, key: &[u8]) -> Result<Option<Bytes>> {
    match db.read_touch(key, |v| v.as_string().map(|b| b.clone())) {
        None => Ok(None),
        Some(Ok(b)) => Ok(Some(b)),
        Some(Err(e)) => Err(e),
    }
}

// ---- GET ----------------------------------------------------------

fn get_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    Ok(bulk_or_null(string_of(db, &args[1])?))
}

// ---- GETEX --------------------------------------------------------

fn getex_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let value = string_of(db, &args[1])?;
    if value.is_none() {
        return Ok(Reply::NullBulk);
    }
    let mut i = 2;
    while i < args.len() {
        if eq_ignore_case(&args[i], "PERSIST") {
            db.persist(&args[1]);
            i += 1;
        } else if eq_ignore_case(&args[i], "EX") || eq_ignore_case(&args[i], "PX") {
            let is_seconds = eq_ignore_case(&args[i], "EX");
            let n = args.get(i + 1).ok_or(Error::Syntax)?;
            let n = parse_i64(n)?;
            if n <= 0 {
                return Err(Error::OutOfRange);
            }
            let dur = if is_seconds {
                Duration::from_secs(n as u64)
            } else {
                Duration::from_millis(n as u64)
            };
            db.expire_at(args[1].clone(), Instant::now() + dur);
            i += 2;
        } else {
            return Err(Error::Syntax);
        }
    }
    Ok(Reply::Bulk(value.unwrap()))
}

fn getex_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    // Only the TTL changes, never the value; compensate with whatever TTL
    // state existed (or its absence) before.
    let had_ttl = db.has_ttl(&args[1]);
    let remaining = db.ttl_remaining(&args[1]);
    Some(vec![if had_ttl {
        vec![
            Bytes::from_static(b"PEXPIRE"),
            args[1].clone(),
            Bytes::from(remaining.unwrap_or_default().as_millis().to_string()),
        ]
    } else {
        vec![Bytes::from_static(b"PERSIST"), args[1].clone()]
    }])
}

// ---- SET ------------------------------------------------------------

fn set_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let value = args[2].clone();
    let mut nx = false;
    let mut xx = false;
    let mut expire_at: Option<Instant> = None;
    let mut i = 3;
    while i < args.len() {
        if eq_ignore_case(&args[i], "NX") {
            nx = true;
            i += 1;
        } else if eq_ignore_case(&args[i], "XX") {
            xx = true;
            i += 1;
        } else if eq_ignore_case(&args[i], "EX") || eq_ignore_case(&args[i], "PX") {
            let is_seconds = eq_ignore_case(&args[i], "EX");
            let n = args.get(i + 1).ok_or(Error::Syntax)?;
            let n = parse_i64(n)?;
            if n <= 0 {
                return Err(Error::OutOfRange);
            }
            expire_at = Some(
                Instant::now()
                    + if is_seconds {
                        Duration::from_secs(n as u64)
                    } else {
                        Duration::from_millis(n as u64)
                    },
            );
            i += 2;
        } else {
            return Err(Error::Syntax);
        }
    }
    if nx && xx {
        return Err(Error::Syntax);
    }
    let exists = db.exists(key);
    if nx && exists {
        return Ok(Reply::NullBulk);
    }
    if xx && !exists {
        return Ok(Reply::NullBulk);
    }
    db.persist(key);
    db.set(key.clone(), DataValue::String(value));
    if let Some(at) = expire_at {
        db.expire_at(key.clone(), at);
    }
    Ok(Reply::ok())
}

fn set_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    Some(rollback_first_key(db, &args[1]))
}

// ---- SETNX / SETEX / PSETEX ----------------------------------------

fn setnx_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    if db.exists(key) {
        return Ok(Reply::Integer(0));
    }
    db.persist(key);
    db.set(key.clone(), DataValue::String(args[2].clone()));
    Ok(Reply::Integer(1))
}

fn setex_family_exec(is_seconds: bool) -> impl Fn(&Database, &[Bytes]) -> Result<Reply> {
    move |db, args| {
        let key = &args[1];
        let n = parse_i64(&args[2])?;
        if n <= 0 {
            return Err(Error::OutOfRange);
        }
        let dur = if is_seconds {
            Duration::from_secs(n as u64)
        } else {
            Duration::from_millis(n as u64)
        };
        db.persist(key);
        db.set(key.clone(), DataValue::String(args[3].clone()));
        db.expire_at(key.clone(), Instant::now() + dur);
        Ok(Reply::ok())
    }
}

fn setex_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    setex_family_exec(true)(db, args)
}

fn psetex_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    setex_family_exec(false)(db, args)
}

// ---- MSET / MGET / MSETNX -------------------------------------------

fn even_pairs(args: &[Bytes]) -> Result<()> {
    if (args.len() - 1) % 2 != 0 || args.len() < 3 {
        return Err(Error::Syntax);
    }
    Ok(())
}

fn mset_prepare(args: &[Bytes]) -> Result<KeySpec> {
    even_pairs(args)?;
    let keys = args[1..].iter().step_by(2).cloned().collect();
    Ok(KeySpec::write(keys))
}

fn mset_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    even_pairs(args)?;
    for pair in args[1..].chunks(2) {
        db.persist(&pair[0]);
        db.set(pair[0].clone(), DataValue::String(pair[1].clone()));
    }
    Ok(Reply::ok())
}

fn mset_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let mut plan = Vec::new();
    for pair in args[1..].chunks(2) {
        plan.append(&mut rollback_first_key(db, &pair[0]));
    }
    Some(plan)
}

fn mget_prepare(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::read(args[1..].to_vec()))
}

fn mget_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let mut out = Vec::with_capacity(args.len() - 1);
    for key in &args[1..] {
        let value = db.read_touch(key, |v| v.as_string().map(|b| b.clone()));
        out.push(match value {
            Some(Ok(b)) => Reply::Bulk(b),
            _ => Reply::NullBulk,
        });
    }
    Ok(Reply::Array(out))
}

fn msetnx_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    even_pairs(args)?;
    if args[1..].chunks(2).any(|pair| db.exists(&pair[0])) {
        return Ok(Reply::Integer(0));
    }
    for pair in args[1..].chunks(2) {
        db.set(pair[0].clone(), DataValue::String(pair[1].clone()));
    }
    Ok(Reply::Integer(1))
}

fn msetnx_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    mset_undo(db, args)
}

// ---- GETSET / GETDEL ------------------------------------------------

fn getset_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let prior = db.read_touch(key, |v| v.as_string().map(|b| b.clone()));
    if let Some(Err(e)) = prior {
        return Err(e);
    }
    db.persist(key);
    let old = db.set(key.clone(), DataValue::String(args[2].clone()));
    Ok(bulk_or_null(old.and_then(|e| e.data.as_string().ok().cloned())))
}

fn getset_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    Some(rollback_first_key(db, &args[1]))
}

fn getdel_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    match db.read_touch(key, |v| v.as_string().cloned()) {
        None => Ok(Reply::NullBulk),
        Some(Err(e)) => Err(e),
        Some(Ok(b)) => {
            db.remove_key(key);
            Ok(Reply::Bulk(b))
        }
    }
}

fn getdel_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    Some(rollback_first_key(db, &args[1]))
}

// ---- INCR family ------------------------------------------------------

fn incrby_exec(delta: i64) -> impl Fn(&Database, &[Bytes]) -> Result<Reply> {
    move |db, args| {
        let key = &args[1];
        let step = if args.len() > 2 {
            parse_i64(&args[2])? * delta.signum()
        } else {
            delta
        };
        let result = db.write_or_insert(
            key.clone(),
            || DataValue::String(Bytes::from_static(b"0")),
            |entry| -> Result<i64> {
                let bytes = entry.data.as_string()?;
                let current: i64 = std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(Error::OutOfRange)?;
                let next = current.checked_add(step).ok_or(Error::OutOfRange)?;
                entry.data = DataValue::String(Bytes::from(next.to_string()));
                Ok(next)
            },
        )?;
        Ok(Reply::Integer(result))
    }
}

fn incr_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    incrby_exec(1)(db, args)
}

fn incrby_cmd_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    incrby_exec(1)(db, args)
}

fn decr_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    incrby_exec(-1)(db, args)
}

fn decrby_cmd_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    incrby_exec(-1)(db, args)
}

fn incrbyfloat_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let delta = Decimal::parse(std::str::from_utf8(&args[2]).map_err(|_| Error::OutOfRange)?)?;
    let result = db.write_or_insert(
        key.clone(),
        || DataValue::String(Bytes::from_static(b"0")),
        |entry| -> Result<String> {
            let bytes = entry.data.as_string()?;
            let current = Decimal::parse(std::str::from_utf8(bytes).map_err(|_| Error::OutOfRange)?)?;
            let next = current.add(delta)?;
            let rendered = next.to_trimmed_string();
            entry.data = DataValue::String(Bytes::from(rendered.clone()));
            Ok(rendered)
        },
    )?;
    Ok(Reply::Bulk(Bytes::from(result)))
}

fn incr_family_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    Some(rollback_first_key(db, &args[1]))
}

// ---- STRLEN / APPEND / SETRANGE / GETRANGE --------------------------

fn strlen_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let len = string_of(db, &args[1])?.map(|b| b.len()).unwrap_or(0);
    Ok(Reply::Integer(len as i64))
}

fn append_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let added = args[2].clone();
    let len = db.write_or_insert(
        key.clone(),
        || DataValue::String(Bytes::new()),
        |entry| -> Result<usize> {
            let bytes = entry.data.as_string()?;
            let mut buf = bytes.to_vec();
            buf.extend_from_slice(&added);
            let len = buf.len();
            entry.data = DataValue::String(Bytes::from(buf));
            Ok(len)
        },
    )?;
    Ok(Reply::Integer(len as i64))
}

fn setrange_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let offset = parse_i64(&args[2])?;
    if offset < 0 {
        return Err(Error::OutOfRange);
    }
    let patch = args[3].clone();
    let offset = offset as usize;
    let len = db.write_or_insert(
        key.clone(),
        || DataValue::String(Bytes::new()),
        |entry| -> Result<usize> {
            let bytes = entry.data.as_string()?;
            let mut buf = bytes.to_vec();
            if buf.len() < offset + patch.len() {
                buf.resize(offset + patch.len(), 0);
            }
            buf[offset..offset + patch.len()].copy_from_slice(&patch);
            let len = buf.len();
            entry.data = DataValue::String(Bytes::from(buf));
            Ok(len)
        },
    )?;
    Ok(Reply::Integer(len as i64))
}

fn getrange_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let start = parse_i64(&args[2])?;
    let end = parse_i64(&args[3])?;
    let Some(bytes) = string_of(db, &args[1])? else {
        return Ok(Reply::Bulk(Bytes::new()));
    };
    let len = bytes.len() as i64;
    if len == 0 {
        return Ok(Reply::Bulk(Bytes::new()));
    }
    let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
    let start = norm(start).max(0);
    let end = norm(end).min(len - 1);
    if start > end || start >= len {
        return Ok(Reply::Bulk(Bytes::new()));
    }
    Ok(Reply::Bulk(bytes.slice(start as usize..=end as usize)))
}

// ---- bit commands -----------------------------------------------------

fn setbit_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let offset = parse_i64(&args[2])?;
    if offset < 0 {
        return Err(Error::OutOfRange);
    }
    let bit = parse_i64(&args[3])?;
    if bit != 0 && bit != 1 {
        return Err(Error::OutOfRange);
    }
    let old = db.write_or_insert(
        key.clone(),
        || DataValue::String(Bytes::new()),
        |entry| -> Result<u8> {
            let bytes = entry.data.as_string()?;
            let mut bitmap = Bitmap::from_bytes(bytes.clone());
            let old = bitmap.set_bit(offset as u64, bit as u8);
            entry.data = DataValue::String(bitmap.as_bytes());
            Ok(old)
        },
    )?;
    Ok(Reply::Integer(old as i64))
}

fn getbit_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let offset = parse_i64(&args[2])?;
    if offset < 0 {
        return Err(Error::OutOfRange);
    }
    let bytes = string_of(db, &args[1])?.unwrap_or_default();
    let bitmap = Bitmap::from_bytes(bytes);
    Ok(Reply::Integer(bitmap.get_bit(offset as u64) as i64))
}

fn bitcount_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let bytes = string_of(db, &args[1])?.unwrap_or_default();
    let bitmap = Bitmap::from_bytes(bytes);
    let (start, end, by_bit) = match args.len() {
        2 => (0, -1, false),
        4 | 5 => {
            let by_bit = args
                .get(4)
                .map(|m| eq_ignore_case(m, "BIT"))
                .unwrap_or(false);
            (parse_i64(&args[2])?, parse_i64(&args[3])?, by_bit)
        }
        _ => return Err(Error::Syntax),
    };
    Ok(Reply::Integer(bitmap.bit_count(start, end, by_bit) as i64))
}

fn bitpos_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let bytes = string_of(db, &args[1])?.unwrap_or_default();
    let bitmap = Bitmap::from_bytes(bytes);
    let target = parse_i64(&args[2])?;
    if target != 0 && target != 1 {
        return Err(Error::OutOfRange);
    }
    let start = args.get(3).map(|b| parse_i64(b)).transpose()?.unwrap_or(0);
    let end = args.get(4).map(|b| parse_i64(b)).transpose()?.unwrap_or(-1);
    let by_bit = args
        .get(5)
        .map(|m| eq_ignore_case(m, "BIT"))
        .unwrap_or(false);
    Ok(Reply::Integer(bitmap.bit_pos(target as u8, start, end, by_bit)))
}

fn string_mutate_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    Some(rollback_first_key(db, &args[1]))
}

pub static SPECS: &[CommandSpec] = &[
    CommandSpec {
        name: "get",
        arity: 2,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: get_exec,
        undo: None,
    },
    CommandSpec {
        name: "getex",
        arity: -2,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: getex_exec,
        undo: Some(getex_undo),
    },
    CommandSpec {
        name: "set",
        arity: -3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: set_exec,
        undo: Some(set_undo),
    },
    CommandSpec {
        name: "setnx",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: setnx_exec,
        undo: Some(set_undo),
    },
    CommandSpec {
        name: "setex",
        arity: 4,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: setex_exec,
        undo: Some(set_undo),
    },
    CommandSpec {
        name: "psetex",
        arity: 4,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: psetex_exec,
        undo: Some(set_undo),
    },
    CommandSpec {
        name: "mset",
        arity: -3,
        flags: CommandFlags::WRITE,
        prepare: mset_prepare,
        execute: mset_exec,
        undo: Some(mset_undo),
    },
    CommandSpec {
        name: "mget",
        arity: -2,
        flags: CommandFlags::READONLY,
        prepare: mget_prepare,
        execute: mget_exec,
        undo: None,
    },
    CommandSpec {
        name: "msetnx",
        arity: -3,
        flags: CommandFlags::WRITE,
        prepare: mset_prepare,
        execute: msetnx_exec,
        undo: Some(msetnx_undo),
    },
    CommandSpec {
        name: "getset",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: getset_exec,
        undo: Some(getset_undo),
    },
    CommandSpec {
        name: "getdel",
        arity: 2,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: getdel_exec,
        undo: Some(getdel_undo),
    },
    CommandSpec {
        name: "incr",
        arity: 2,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: incr_exec,
        undo: Some(incr_family_undo),
    },
    CommandSpec {
        name: "incrby",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: incrby_cmd_exec,
        undo: Some(incr_family_undo),
    },
    CommandSpec {
        name: "incrbyfloat",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: incrbyfloat_exec,
        undo: Some(incr_family_undo),
    },
    CommandSpec {
        name: "decr",
        arity: 2,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: decr_exec,
        undo: Some(incr_family_undo),
    },
    CommandSpec {
        name: "decrby",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: decrby_cmd_exec,
        undo: Some(incr_family_undo),
    },
    CommandSpec {
        name: "strlen",
        arity: 2,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: strlen_exec,
        undo: None,
    },
    CommandSpec {
        name: "append",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: append_exec,
        undo: Some(string_mutate_undo),
    },
    CommandSpec {
        name: "setrange",
        arity: 4,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: setrange_exec,
        undo: Some(string_mutate_undo),
    },
    CommandSpec {
        name: "getrange",
        arity: 4,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: getrange_exec,
        undo: None,
    },
    CommandSpec {
        name: "setbit",
        arity: 4,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: setbit_exec,
        undo: Some(string_mutate_undo),
    },
    CommandSpec {
        name: "getbit",
        arity: 3,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: getbit_exec,
        undo: None,
    },
    CommandSpec {
        name: "bitcount",
        arity: -2,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: bitcount_exec,
        undo: None,
    },
    CommandSpec {
        name: "bitpos",
        arity: -3,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: bitpos_exec,
        undo: None,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::line::to_command_line;
    use crate::storage::time_wheel::TimeWheel;

    fn fresh_db() -> Database {
        Database::new(0, TimeWheel::new(), None)
    }

    #[tokio::test]
    async fn set_get_del() {
        let db = fresh_db();
        assert_eq!(db.exec_normal(&to_command_line(&["SET", "foo", "bar"])).await, Reply::ok());
        assert_eq!(
            db.exec_normal(&to_command_line(&["GET", "foo"])).await,
            Reply::Bulk(Bytes::from_static(b"bar"))
        );
    }

    #[tokio::test]
    async fn incrby_parses_and_accumulates() {
        let db = fresh_db();
        db.exec_normal(&to_command_line(&["SET", "n", "10"])).await;
        assert_eq!(db.exec_normal(&to_command_line(&["INCRBY", "n", "5"])).await, Reply::Integer(15));
        assert!(db.exec_normal(&to_command_line(&["INCRBY", "n", "xyz"])).await.is_error());
        assert_eq!(
            db.exec_normal(&to_command_line(&["GET", "n"])).await,
            Reply::Bulk(Bytes::from_static(b"15"))
        );
    }

    #[tokio::test]
    async fn setnx_respects_existing_key() {
        let db = fresh_db();
        assert_eq!(db.exec_normal(&to_command_line(&["SETNX", "k", "1"])).await, Reply::Integer(1));
        assert_eq!(db.exec_normal(&to_command_line(&["SETNX", "k", "2"])).await, Reply::Integer(0));
    }

    #[tokio::test]
    async fn bit_ops_roundtrip() {
        let db = fresh_db();
        db.exec_normal(&to_command_line(&["SETBIT", "b", "7", "1"])).await;
        assert_eq!(db.exec_normal(&to_command_line(&["GETBIT", "b", "7"])).await, Reply::Integer(1));
        assert_eq!(db.exec_normal(&to_command_line(&["BITCOUNT", "b"])).await, Reply::Integer(1));
    }

    #[tokio::test]
    async fn wrong_type_on_incr_over_list_like_value() {
        let db = fresh_db();
        db.exec_normal(&to_command_line(&["SET", "k", "not-a-number"])).await;
        assert!(db.exec_normal(&to_command_line(&["INCR", "k"])).await.is_error());
    }
}
