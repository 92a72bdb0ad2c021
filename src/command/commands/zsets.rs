//! Sorted set commands (spec.md §6 "SortedSet").

use bytes::Bytes;

use crate::command::flags::CommandFlags;
use crate::command::line::CommandLine;
use crate::command::registry::{CommandSpec, KeySpec};
use crate::db::database::Database;
use crate::db::undo::format_score;
use crate::error::{Error, Result};
use crate::reply::Reply;
use crate::storage::entry::DataValue;
use crate::storage::zset::{ScoreBoundary, SortedSet};

use super::util::{parse_f64, parse_i64};

fn read_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::read(vec![args[1].clone()]))
}

fn write_one(args: &[Bytes]) -> Result<KeySpec> {
    Ok(KeySpec::write(vec![args[1].clone()]))
}

fn parse_boundary(b: &Bytes) -> Result<ScoreBoundary> {
    let s = std::str::from_utf8(b).map_err(|_| Error::Syntax)?;
    ScoreBoundary::parse(s).ok_or(Error::Syntax)
}

fn members_only(items: Vec<(Bytes, f64)>) -> Vec<Reply> {
    items.into_iter().map(|(m, _)| Reply::Bulk(m)).collect()
}

// ---- ZADD / ZREM ------------------------------------------------------

fn zadd_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    if args.len() < 4 || (args.len() - 2) % 2 != 0 {
        return Err(Error::Syntax);
    }
    let key = &args[1];
    let added = db.write_or_insert(
        key.clone(),
        || DataValue::SortedSet(SortedSet::new()),
        |entry| -> Result<usize> {
            let zset = entry.data.as_zset_mut()?;
            let mut added = 0;
            for pair in args[2..].chunks(2) {
                let score = parse_f64(&pair[0])?;
                if zset.add(pair[1].clone(), score) {
                    added += 1;
                }
            }
            Ok(added)
        },
    )?;
    Ok(Reply::Integer(added as i64))
}

fn zadd_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let key = &args[1];
    let mut plan = Vec::new();
    for pair in args[2..].chunks(2) {
        let member = &pair[1];
        let prior = db
            .peek(key, |v| v.as_zset().ok().and_then(|z| z.get_score(member)))
            .flatten();
        plan.push(match prior {
            Some(score) => vec![
                Bytes::from_static(b"ZADD"),
                key.clone(),
                Bytes::from(format_score(score)),
                member.clone(),
            ],
            None => vec![Bytes::from_static(b"ZREM"), key.clone(), member.clone()],
        });
    }
    Some(plan)
}

fn zrem_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let key = &args[1];
    let removed = db.write(key, |entry| -> Result<usize> {
        let zset = entry.data.as_zset_mut()?;
        Ok(args[2..].iter().filter(|m| zset.remove(m)).count())
    });
    let removed = match removed {
        None => return Ok(Reply::Integer(0)),
        Some(r) => r?,
    };
    if removed > 0 && db.peek(key, |v| v.as_zset().map(|z| z.is_empty())) == Some(Ok(true)) {
        db.remove_key(key);
    }
    Ok(Reply::Integer(removed as i64))
}

fn zrem_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let key = &args[1];
    let mut plan = Vec::new();
    for member in &args[2..] {
        let prior = db
            .peek(key, |v| v.as_zset().ok().and_then(|z| z.get_score(member)))
            .flatten();
        if let Some(score) = prior {
            plan.push(vec![
                Bytes::from_static(b"ZADD"),
                key.clone(),
                Bytes::from(format_score(score)),
                member.clone(),
            ]);
        }
    }
    Some(plan)
}

// ---- reads --------------------------------------------------------------

fn zscore_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let member = &args[2];
    match db.peek(&args[1], |v| v.as_zset().map(|z| z.get_score(member))) {
        None => Ok(Reply::NullBulk),
        Some(Ok(Some(score))) => Ok(Reply::Bulk(Bytes::from(format_score(score)))),
        Some(Ok(None)) => Ok(Reply::NullBulk),
        Some(Err(e)) => Err(e),
    }
}

fn zcard_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    match db.peek(&args[1], |v| v.as_zset().map(|z| z.len())) {
        None => Ok(Reply::Integer(0)),
        Some(Ok(n)) => Ok(Reply::Integer(n as i64)),
        Some(Err(e)) => Err(e),
    }
}

fn zrank_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let member = &args[2];
    match db.peek(&args[1], |v| v.as_zset().map(|z| z.rank_of(member))) {
        None | Some(Ok(None)) => Ok(Reply::NullBulk),
        Some(Ok(Some(r))) => Ok(Reply::Integer(r as i64)),
        Some(Err(e)) => Err(e),
    }
}

fn zrevrank_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let member = &args[2];
    match db.peek(&args[1], |v| v.as_zset().map(|z| z.rev_rank_of(member))) {
        None | Some(Ok(None)) => Ok(Reply::NullBulk),
        Some(Ok(Some(r))) => Ok(Reply::Integer(r as i64)),
        Some(Err(e)) => Err(e),
    }
}

fn zrange_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let start = parse_i64(&args[2])?;
    let stop = parse_i64(&args[3])?;
    match db.peek(&args[1], |v| v.as_zset().map(|z| z.range(start, stop))) {
        None => Ok(Reply::Array(Vec::new())),
        Some(Ok(items)) => Ok(Reply::Array(members_only(items))),
        Some(Err(e)) => Err(e),
    }
}

fn zrevrange_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let start = parse_i64(&args[2])?;
    let stop = parse_i64(&args[3])?;
    match db.peek(&args[1], |v| v.as_zset().map(|z| z.rev_range(start, stop))) {
        None => Ok(Reply::Array(Vec::new())),
        Some(Ok(items)) => Ok(Reply::Array(members_only(items))),
        Some(Err(e)) => Err(e),
    }
}

fn zrangebyscore_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let min = parse_boundary(&args[2])?;
    let max = parse_boundary(&args[3])?;
    match db.peek(&args[1], |v| v.as_zset().map(|z| z.range_by_score(min, max))) {
        None => Ok(Reply::Array(Vec::new())),
        Some(Ok(items)) => Ok(Reply::Array(members_only(items))),
        Some(Err(e)) => Err(e),
    }
}

fn zcount_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let min = parse_boundary(&args[2])?;
    let max = parse_boundary(&args[3])?;
    match db.peek(&args[1], |v| v.as_zset().map(|z| z.count_by_score(min, max))) {
        None => Ok(Reply::Integer(0)),
        Some(Ok(n)) => Ok(Reply::Integer(n as i64)),
        Some(Err(e)) => Err(e),
    }
}

// ---- range removal ------------------------------------------------------

fn zremrangebyscore_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let min = parse_boundary(&args[2])?;
    let max = parse_boundary(&args[3])?;
    let key = &args[1];
    let removed = db.write(key, |entry| -> Result<u64> {
        let zset = entry.data.as_zset_mut()?;
        Ok(zset.remove_range_by_score(min, max))
    });
    let removed = match removed {
        None => return Ok(Reply::Integer(0)),
        Some(r) => r?,
    };
    if removed > 0 && db.peek(key, |v| v.as_zset().map(|z| z.is_empty())) == Some(Ok(true)) {
        db.remove_key(key);
    }
    Ok(Reply::Integer(removed as i64))
}

fn zremrangebyscore_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let key = &args[1];
    let min = parse_boundary(&args[2]).ok()?;
    let max = parse_boundary(&args[3]).ok()?;
    let victims = db
        .peek(key, |v| v.as_zset().ok().map(|z| z.range_by_score(min, max)))
        .flatten()
        .unwrap_or_default();
    Some(restore_plan(key, victims))
}

fn zremrangebyrank_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let start = parse_i64(&args[2])?;
    let stop = parse_i64(&args[3])?;
    let key = &args[1];
    let removed = db.write(key, |entry| -> Result<u64> {
        let zset = entry.data.as_zset_mut()?;
        Ok(zset.remove_range_by_rank(start, stop))
    });
    let removed = match removed {
        None => return Ok(Reply::Integer(0)),
        Some(r) => r?,
    };
    if removed > 0 && db.peek(key, |v| v.as_zset().map(|z| z.is_empty())) == Some(Ok(true)) {
        db.remove_key(key);
    }
    Ok(Reply::Integer(removed as i64))
}

fn zremrangebyrank_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let key = &args[1];
    let start = parse_i64(&args[2]).ok()?;
    let stop = parse_i64(&args[3]).ok()?;
    let victims = db
        .peek(key, |v| v.as_zset().ok().map(|z| z.range(start, stop)))
        .flatten()
        .unwrap_or_default();
    Some(restore_plan(key, victims))
}

fn restore_plan(key: &Bytes, victims: Vec<(Bytes, f64)>) -> Vec<CommandLine> {
    victims
        .into_iter()
        .map(|(m, score)| {
            vec![
                Bytes::from_static(b"ZADD"),
                key.clone(),
                Bytes::from(format_score(score)),
                m,
            ]
        })
        .collect()
}

// ---- ZPOPMIN --------------------------------------------------------

fn zpopmin_exec(db: &Database, args: &[Bytes]) -> Result<Reply> {
    let count = if args.len() > 2 { parse_i64(&args[2])? } else { 1 };
    if count < 0 {
        return Err(Error::OutOfRange);
    }
    if count == 0 {
        return Ok(Reply::Array(Vec::new()));
    }
    let key = &args[1];
    let popped = db.write(key, |entry| -> Result<Vec<(Bytes, f64)>> {
        let zset = entry.data.as_zset_mut()?;
        Ok(zset.pop_min(count as usize))
    });
    let popped = match popped {
        None => return Ok(Reply::Array(Vec::new())),
        Some(r) => r?,
    };
    if !popped.is_empty() && db.peek(key, |v| v.as_zset().map(|z| z.is_empty())) == Some(Ok(true)) {
        db.remove_key(key);
    }
    let mut out = Vec::with_capacity(popped.len() * 2);
    for (member, score) in popped {
        out.push(Reply::Bulk(member));
        out.push(Reply::Bulk(Bytes::from(format_score(score))));
    }
    Ok(Reply::Array(out))
}

fn zpopmin_undo(db: &Database, args: &[Bytes]) -> Option<Vec<CommandLine>> {
    let count = if args.len() > 2 { parse_i64(&args[2]).ok()? } else { 1 };
    if count <= 0 {
        return Some(Vec::new());
    }
    let key = &args[1];
    let victims = db
        .peek(key, |v| v.as_zset().ok().map(|z| z.range(0, count - 1)))
        .flatten()
        .unwrap_or_default();
    Some(restore_plan(key, victims))
}

pub static SPECS: &[CommandSpec] = &[
    CommandSpec {
        name: "zadd",
        arity: -4,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: zadd_exec,
        undo: Some(zadd_undo),
    },
    CommandSpec {
        name: "zrem",
        arity: -3,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: zrem_exec,
        undo: Some(zrem_undo),
    },
    CommandSpec {
        name: "zscore",
        arity: 3,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: zscore_exec,
        undo: None,
    },
    CommandSpec {
        name: "zcard",
        arity: 2,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: zcard_exec,
        undo: None,
    },
    CommandSpec {
        name: "zrank",
        arity: 3,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: zrank_exec,
        undo: None,
    },
    CommandSpec {
        name: "zrevrank",
        arity: 3,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: zrevrank_exec,
        undo: None,
    },
    CommandSpec {
        name: "zrange",
        arity: 4,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: zrange_exec,
        undo: None,
    },
    CommandSpec {
        name: "zrevrange",
        arity: 4,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: zrevrange_exec,
        undo: None,
    },
    CommandSpec {
        name: "zrangebyscore",
        arity: 4,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: zrangebyscore_exec,
        undo: None,
    },
    CommandSpec {
        name: "zcount",
        arity: 4,
        flags: CommandFlags::READONLY,
        prepare: read_one,
        execute: zcount_exec,
        undo: None,
    },
    CommandSpec {
        name: "zremrangebyscore",
        arity: 4,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: zremrangebyscore_exec,
        undo: Some(zremrangebyscore_undo),
    },
    CommandSpec {
        name: "zremrangebyrank",
        arity: 4,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: zremrangebyrank_exec,
        undo: Some(zremrangebyrank_undo),
    },
    CommandSpec {
        name: "zpopmin",
        arity: -2,
        flags: CommandFlags::WRITE,
        prepare: write_one,
        execute: zpopmin_exec,
        undo: Some(zpopmin_undo),
    },
];
