// tests/integration/list_commands_test.rs

//! Integration tests for list commands. Covers spec.md §8 scenario S3
//! and the "list empties itself out of existence" invariant spec.md
//! §4.4 calls out explicitly.

use super::test_helpers::TestContext;
use bytes::Bytes;
use ridgekv::reply::Reply;

fn bulk(s: &str) -> Reply {
    Reply::Bulk(Bytes::copy_from_slice(s.as_bytes()))
}

#[tokio::test]
async fn s3_rpush_range_pop_len() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["RPUSH", "k", "a", "b", "c"]).await, Reply::Integer(3));
    assert_eq!(
        ctx.cmd(&["LRANGE", "k", "0", "-1"]).await,
        Reply::Array(vec![bulk("a"), bulk("b"), bulk("c")])
    );
    assert_eq!(ctx.cmd(&["LPOP", "k"]).await, bulk("a"));
    assert_eq!(ctx.cmd(&["LLEN", "k"]).await, Reply::Integer(2));
}

#[tokio::test]
async fn lpush_prepends_in_reverse_of_each_call() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["LPUSH", "k", "a", "b", "c"]).await;
    assert_eq!(
        ctx.cmd(&["LRANGE", "k", "0", "-1"]).await,
        Reply::Array(vec![bulk("c"), bulk("b"), bulk("a")])
    );
}

#[tokio::test]
async fn lindex_supports_negative_index() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["RPUSH", "k", "a", "b", "c"]).await;
    assert_eq!(ctx.cmd(&["LINDEX", "k", "-1"]).await, bulk("c"));
    assert_eq!(ctx.cmd(&["LINDEX", "k", "99"]).await, Reply::NullBulk);
}

#[tokio::test]
async fn list_key_is_removed_once_emptied() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["RPUSH", "k", "only"]).await;
    assert_eq!(ctx.cmd(&["LPOP", "k"]).await, bulk("only"));
    assert_eq!(ctx.cmd(&["EXISTS", "k"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["LLEN", "k"]).await, Reply::Integer(0));
}

#[tokio::test]
async fn pop_on_missing_key_is_null_not_an_error() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["LPOP", "nope"]).await, Reply::NullBulk);
    assert_eq!(ctx.cmd(&["RPOP", "nope"]).await, Reply::NullBulk);
}
