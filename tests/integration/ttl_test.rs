// tests/integration/ttl_test.rs

//! Integration tests for TTL/expiration. Covers spec.md §8 property P5:
//! a key is readable within its expiration window, absent from both
//! `data` and `ttl` afterward, and `PERSIST` cancels a pending removal.

use super::test_helpers::TestContext;
use bytes::Bytes;
use ridgekv::reply::Reply;
use std::time::Duration;

#[tokio::test]
async fn p5_key_expires_after_its_pttl_elapses() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "v"]).await;
    ctx.cmd(&["PEXPIRE", "k", "40"]).await;

    assert_eq!(ctx.cmd(&["GET", "k"]).await, Reply::Bulk(Bytes::from_static(b"v")));

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(ctx.cmd(&["GET", "k"]).await, Reply::NullBulk);
    assert_eq!(ctx.cmd(&["EXISTS", "k"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["TTL", "k"]).await, Reply::Integer(-2));
}

#[tokio::test]
async fn p5_persist_cancels_the_scheduled_removal() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "v"]).await;
    ctx.cmd(&["PEXPIRE", "k", "40"]).await;
    assert_eq!(ctx.cmd(&["PERSIST", "k"]).await, Reply::Integer(1));

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(ctx.cmd(&["GET", "k"]).await, Reply::Bulk(Bytes::from_static(b"v")));
    assert_eq!(ctx.cmd(&["TTL", "k"]).await, Reply::Integer(-1));
}

#[tokio::test]
async fn ttl_on_a_key_without_expiration_is_minus_one_and_missing_key_is_minus_two() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "v"]).await;
    assert_eq!(ctx.cmd(&["TTL", "k"]).await, Reply::Integer(-1));
    assert_eq!(ctx.cmd(&["TTL", "nope"]).await, Reply::Integer(-2));
}

#[tokio::test]
async fn expire_with_non_positive_seconds_deletes_immediately() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "v"]).await;
    assert_eq!(ctx.cmd(&["EXPIRE", "k", "0"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["EXISTS", "k"]).await, Reply::Integer(0));
}
