//! Generic key-space commands (spec.md §6 "Keys"): existence, TTL
//! management, renaming, and type introspection. `FLUSHALL` is dispatched
//! at the server level (it spans every database), not registered here.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::command::flags::CommandFlags;
use crate::command::line::CommandLine;
use crate::command::registry::{CommandSpec, KeySpec};
use crate::db::database::Database;
use crate::db::undo::rollback_first_key;
use crate::error::{Error, Result};
use crate::reply::Reply;

use super::util::parse_i64;

fn read_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::read(vec![args[1].clone()]))
}

fn write_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::write(vec![args[1].clone()]))
}

fn del_prepare(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::write(args[1..].to_vec()))
}

fn exists_prepare(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::read(args[1..].to_vec()))
}

fn rename_prepare(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::write(vec![args[1].clone(), args[2].clone()]))
}

fn no_keys(_args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::none())
}

/// Converts an absolute Unix-epoch millisecond timestamp (as PEXPIREAT
/// takes) into an `Instant`, since the TTL store is keyed by the
/// monotonic clock rather than wall time.
fn at_from_unix_millis(ms: i64) -> Result<Instant> {
    if ms < 0 {
        return Err(Error::OutOfRange);
    }
    let target = UNIX_EPOCH + Duration::from_millis(ms as u64);
    match target.duration_since(SystemTime::now()) {
        Ok(remaining) => Ok(Instant::now() + remaining),
        Err(_) => Ok(Instant::now()),
    }
}

fn ttl_restore_undo(db: &Database, key: &Bytes) -> Vec<CommandLine> {
    if db.has_ttl(key) {
        let remaining = db.ttl_remaining(key).unwrap_or_default();
        vec![vec![
            Bytes::from_static(b"PEXPIRE"),
            key.clone(),
            Bytes::from(remaining.as_millis().to_string()),
        ]]
    } else {
        vec![vec![Bytes::from_static(b"PERSIST"), key.clone()]]
    }
}

// ---- DEL / EXISTS / TYPE ----------------------------------------------

fn del_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let removed = args[1..].iter().filter(|k| db.remove_key(k)).count();
    Ok(Reply::Integer(removed as i64))
}

fn del_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let mut plan = Vec::new();
    for key in &args[1..] {
        plan.append(&mut rollback_first_key(db, key));
    }
    Some(plan)
}

fn exists_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let count = args[1..].iter().filter(|k| db.exists(k)).count();
    Ok(Reply::Integer(count as i64))
}

fn type_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    Ok(Reply::SimpleString(db.type_name(&args[1]).unwrap_or("none")))
}

// ---- TTL family ---------------------------------------------------------

fn expire_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    if !db.exists(key) {
        return Ok(Reply::Integer(0));
    }
    let secs = parse_i64(&args[2])?;
    if secs <= 0 {
        db.remove_key(key);
    } else {
        db.expire_at(key.clone(), Instant::now() + Duration::from_secs(secs as u64));
    }
    Ok(Reply::Integer(1))
}

fn pexpire_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    if !db.exists(key) {
        return Ok(Reply::Integer(0));
    }
    let ms = parse_i64(&args[2])?;
    if ms <= 0 {
        db.remove_key(key);
    } else {
        db.expire_at(key.clone(), Instant::now() + Duration::from_millis(ms as u64));
    }
    Ok(Reply::Integer(1))
}

fn pexpireat_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    if !db.exists(key) {
        return Ok(Reply::Integer(0));
    }
    let ms = parse_i64(&args[2])?;
    let at = at_from_unix_millis(ms)?;
    if at <= Instant::now() {
        db.remove_key(key);
    } else {
        db.expire_at(key.clone(), at);
    }
    Ok(Reply::Integer(1))
}

fn expire_family_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    Some(ttl_restore_undo(db, &args[1]))
}

fn persist_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    Ok(Reply::Integer(db.persist(&args[1]) as i64))
}

fn persist_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    Some(ttl_restore_undo(db, &args[1]))
}

fn ttl_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    if !db.exists(key) {
        return Ok(Reply::Integer(-2));
    }
    match db.ttl_remaining(key) {
        Some(d) => Ok(Reply::Integer(d.as_secs() as i64)),
        None => Ok(Reply::Integer(-1)),
    }
}

// ---- RENAME / RENAMENX ---------------------------------------------------

fn move_key(db: &Database, src: &Bytes, dst: &Bytes) {
    let had_ttl = db.has_ttl(src);
    let remaining = db.ttl_remaining(src);
    // `take_key` unwraps safely: callers only reach here after `db.exists(src)`.
    let entry = db.take_key(src).expect("checked by caller");
    db.set(dst.clone(), entry.data);
    if had_ttl {
        if let Some(dur) = remaining {
            db.expire_at(dst.clone(), Instant::now() + dur);
        }
    } else {
        db.persist(dst);
    }
}

fn rename_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let src = &args[1];
    let dst = &args[2];
    if !db.exists(src) {
        return Err(Error::NoSuchKey);
    }
    move_key(db, src, dst);
    Ok(Reply::ok())
}

fn renamenx_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let src = &args[1];
    let dst = &args[2];
    if !db.exists(src) {
        return Err(Error::NoSuchKey);
    }
    if db.exists(dst) {
        return Ok(Reply::Integer(0));
    }
    move_key(db, src, dst);
    Ok(Reply::Integer(1))
}

fn rename_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let mut plan = rollback_first_key(db, &args[1]);
    plan.extend(rollback_first_key(db, &args[2]));
    Some(plan)
}

// ---- FLUSHDB --------------------------------------------------------------

fn flushdb_exec(db: &Database, _args: &[Bytes]) -> Result<Reply> {
    db.clear();
    Ok(Reply::ok())
}

pub static SPECS: &[CommandSpec] = &[
    CommandSpec {
        name: "del",
        arity: -2,
        flags: CommandFlags::WRITE,
        prepare: del_prepare,
        execute: del_exec,
        undo: Some(del_undo),
    },
    CommandSpec {
        name: "exists",
        arity: -2,
        flags: CommandFlags::READONLY,
        prepare: exists_prepare,
        execute: exists_exec,
        undo: None,
    },
    CommandSpec {
        name: "type",
        arity: 2,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: type_exec,
        undo: None,
    },
    CommandSpec {
        name: "expire",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: expire_exec,
        undo: Some(expire_family_undo),
    },
    CommandSpec {
        name: "pexpire",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: pexpire_exec,
        undo: Some(expire_family_undo),
    },
    CommandSpec {
        name: "pexpireat",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: pexpireat_exec,
        undo: Some(expire_family_undo),
    },
    CommandSpec {
        name: "persist",
        arity: 2,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: persist_exec,
        undo: Some(persist_undo),
    },
    CommandSpec {
        name: "ttl",
        arity: 2,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: ttl_exec,
        undo: None,
    },
    CommandSpec {
        name: "rename",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: rename_prepare,
        execute: rename_exec,
        undo: Some(rename_undo),
    },
    CommandSpec {
        name: "renamenx",
        arity: 3,
        flags: CommandFlags::WRITE,
        prepare: rename_prepare,
        execute: renamenx_exec,
        undo: Some(rename_undo),
    },
    CommandSpec {
        name: "flushdb",
        arity: 1,
        flags: CommandFlags::WRITE | CommandFlags::ADMIN,
        prepare: no_keys,
        execute: flushdb_exec,
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
    async fn del_and_exists() {
        let db = fresh_db();
        db.exec_normal(&to_command_line(&["SET", "a", "1"])).await;
        db.exec_normal(&to_command_line(&["SET", "b", "2"])).await;
        let r = db.exec_normal(&to_command_line(&["EXISTS", "a", "b", "c"])).await;
        assert_eq!(r, Reply::Integer(2));
        let r = db.exec_normal(&to_command_line(&["DEL", "a", "b", "c"])).await;
        assert_eq!(r, Reply::Integer(2));
        assert_eq!(
            db.exec_normal(&to_command_line(&["EXISTS", "a"])).await,
            Reply::Integer(0)
        );
    }

    #[tokio::test]
    async fn expire_then_ttl_then_persist() {
        let db = fresh_db();
        db.exec_normal(&to_command_line(&["SET", "k", "v"])).await;
        db.exec_normal(&to_command_line(&["EXPIRE", "k", "100"])).await;
        let r = db.exec_normal(&to_command_line(&["TTL", "k"])).await;
        assert_eq!(r, Reply::Integer(100));
        let r = db.exec_normal(&to_command_line(&["PERSIST", "k"])).await;
        assert_eq!(r, Reply::Integer(1));
        let r = db.exec_normal(&to_command_line(&["TTL", "k"])).await;
        assert_eq!(r, Reply::Integer(-1));
    }

    #[tokio::test]
    async fn ttl_on_missing_key_is_minus_two() {
        let db = fresh_db();
        let r = db.exec_normal(&to_command_line(&["TTL", "nope"])).await;
        assert_eq!(r, Reply::Integer(-2));
    }

    #[tokio::test]
    async fn rename_moves_value_and_errors_on_missing_source() {
        let db = fresh_db();
        db.exec_normal(&to_command_line(&["SET", "a", "1"])).await;
        let r = db.exec_normal(&to_command_line(&["RENAME", "a", "b"])).await;
        assert_eq!(r, Reply::ok());
        assert!(!db.exists(b"a"));
        assert_eq!(
            db.exec_normal(&to_command_line(&["GET", "b"])).await,
            Reply::Bulk(Bytes::from_static(b"1"))
        );
        let r = db.exec_normal(&to_command_line(&["RENAME", "missing", "x"])).await;
        assert!(r.is_error());
    }

    #[tokio::test]
    async fn renamenx_refuses_existing_destination() {
        let db = fresh_db();
        db.exec_normal(&to_command_line(&["SET", "a", "1"])).await;
        db.exec_normal(&to_command_line(&["SET", "b", "2"])).await;
        let r = db.exec_normal(&to_command_line(&["RENAMENX", "a", "b"])).await;
        assert_eq!(r, Reply::Integer(0));
    }

    #[tokio::test]
    async fn type_reports_none_for_missing_key() {
        let db = fresh_db();
        let r = db.exec_normal(&to_command_line(&["TYPE", "nope"])).await;
        assert_eq!(r, Reply::SimpleString("none"));
    }
}
