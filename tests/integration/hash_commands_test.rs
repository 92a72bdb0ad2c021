// tests/integration/hash_commands_test.rs

//! Integration tests for hash commands: HSET/HGET/HDEL/HLEN.

use super::test_helpers::TestContext;
use bytes::Bytes;
use ridgekv::reply::Reply;

#[tokio::test]
async fn hset_hget_roundtrip_and_new_field_count() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["HSET", "h", "f1", "v1", "f2", "v2"]).await, Reply::Integer(2));
    assert_eq!(ctx.cmd(&["HGET", "h", "f1"]).await, Reply::Bulk(Bytes::from_static(b"v1")));
    // Overwriting an existing field doesn't count as "added".
    assert_eq!(ctx.cmd(&["HSET", "h", "f1", "v1-new"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["HGET", "h", "f1"]).await, Reply::Bulk(Bytes::from_static(b"v1-new")));
}

#[tokio::test]
async fn hget_on_missing_field_or_key_is_null() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["HGET", "nope", "f"]).await, Reply::NullBulk);
    ctx.cmd(&["HSET", "h", "f1", "v1"]).await;
    assert_eq!(ctx.cmd(&["HGET", "h", "nofield"]).await, Reply::NullBulk);
}

#[tokio::test]
async fn hdel_removes_fields_and_deletes_key_once_empty() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["HSET", "h", "f1", "v1", "f2", "v2"]).await;
    assert_eq!(ctx.cmd(&["HDEL", "h", "f1"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["HLEN", "h"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["HDEL", "h", "f2"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["EXISTS", "h"]).await, Reply::Integer(0));
}

#[tokio::test]
async fn hset_against_a_string_key_is_wrong_type() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "v"]).await;
    assert!(ctx.cmd(&["HSET", "k", "f", "v"]).await.is_error());
}
