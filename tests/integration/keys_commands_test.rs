// tests/integration/keys_commands_test.rs

//! Integration tests for the generic key-space commands: DEL, EXISTS,
//! TYPE, RENAME, RENAMENX, FLUSHDB.

use super::test_helpers::TestContext;
use bytes::Bytes;
use ridgekv::reply::Reply;

#[tokio::test]
async fn del_counts_only_the_keys_that_existed() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "a", "1"]).await;
    ctx.cmd(&["SET", "b", "2"]).await;
    assert_eq!(ctx.cmd(&["DEL", "a", "b", "nope"]).await, Reply::Integer(2));
    assert_eq!(ctx.cmd(&["EXISTS", "a"]).await, Reply::Integer(0));
}

#[tokio::test]
async fn exists_counts_repeated_keys_once_per_occurrence() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "a", "1"]).await;
    assert_eq!(ctx.cmd(&["EXISTS", "a", "a", "missing"]).await, Reply::Integer(2));
}

#[tokio::test]
async fn type_reports_none_for_a_missing_key_and_the_right_name_for_each_structure() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["TYPE", "nope"]).await, Reply::SimpleString("none"));

    ctx.cmd(&["SET", "s", "v"]).await;
    assert_eq!(ctx.cmd(&["TYPE", "s"]).await, Reply::SimpleString("string"));

    ctx.cmd(&["RPUSH", "l", "v"]).await;
    assert_eq!(ctx.cmd(&["TYPE", "l"]).await, Reply::SimpleString("list"));

    ctx.cmd(&["HSET", "h", "f", "v"]).await;
    assert_eq!(ctx.cmd(&["TYPE", "h"]).await, Reply::SimpleString("hash"));

    ctx.cmd(&["ZADD", "z", "1", "m"]).await;
    assert_eq!(ctx.cmd(&["TYPE", "z"]).await, Reply::SimpleString("zset"));
}

#[tokio::test]
async fn rename_moves_the_value_and_ttl_to_the_new_key() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "src", "v"]).await;
    ctx.cmd(&["EXPIRE", "src", "100"]).await;

    assert_eq!(ctx.cmd(&["RENAME", "src", "dst"]).await, Reply::ok());
    assert_eq!(ctx.cmd(&["EXISTS", "src"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["GET", "dst"]).await, Reply::Bulk(Bytes::from_static(b"v")));
    assert!(matches!(ctx.cmd(&["TTL", "dst"]).await, Reply::Integer(n) if n > 0));
}

#[tokio::test]
async fn rename_on_a_missing_source_key_is_an_error() {
    let mut ctx = TestContext::new().await;
    assert!(ctx.cmd(&["RENAME", "nope", "dst"]).await.is_error());
}

#[tokio::test]
async fn renamenx_refuses_to_overwrite_an_existing_destination() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "src", "new"]).await;
    ctx.cmd(&["SET", "dst", "old"]).await;

    assert_eq!(ctx.cmd(&["RENAMENX", "src", "dst"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["GET", "dst"]).await, Reply::Bulk(Bytes::from_static(b"old")));
    assert_eq!(ctx.cmd(&["GET", "src"]).await, Reply::Bulk(Bytes::from_static(b"new")));
}

#[tokio::test]
async fn renamenx_moves_the_key_when_the_destination_is_free() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "src", "v"]).await;
    assert_eq!(ctx.cmd(&["RENAMENX", "src", "dst"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["EXISTS", "src"]).await, Reply::Integer(0));
}

#[tokio::test]
async fn flushdb_removes_every_key_in_the_current_database() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "a", "1"]).await;
    ctx.cmd(&["SET", "b", "2"]).await;
    assert_eq!(ctx.cmd(&["FLUSHDB"]).await, Reply::ok());
    assert_eq!(ctx.cmd(&["EXISTS", "a"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["EXISTS", "b"]).await, Reply::Integer(0));
}
