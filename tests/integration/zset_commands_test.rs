// tests/integration/zset_commands_test.rs

//! Integration tests for sorted-set commands. Covers spec.md §8 scenario
//! S4 (score-border parsing: open/closed/±inf).

use super::test_helpers::TestContext;
use bytes::Bytes;
use ridgekv::reply::Reply;

fn bulk(s: &str) -> Reply {
    Reply::Bulk(Bytes::copy_from_slice(s.as_bytes()))
}

#[tokio::test]
async fn s4_zrangebyscore_open_and_unbounded_borders() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["ZADD", "z", "1", "a", "2", "b", "3", "c"]).await, Reply::Integer(3));

    assert_eq!(
        ctx.cmd(&["ZRANGEBYSCORE", "z", "(1", "+inf"]).await,
        Reply::Array(vec![bulk("b"), bulk("c")])
    );
    assert_eq!(
        ctx.cmd(&["ZRANGEBYSCORE", "z", "-inf", "2"]).await,
        Reply::Array(vec![bulk("a"), bulk("b")])
    );
}

#[tokio::test]
async fn zadd_on_existing_member_updates_score_without_counting_as_added() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["ZADD", "z", "1", "a"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["ZADD", "z", "5", "a"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["ZSCORE", "z", "a"]).await, Reply::Bulk(Bytes::from_static(b"5")));
}

#[tokio::test]
async fn zrank_and_zrevrank_are_zero_based_and_opposite_ordered() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["ZADD", "z", "1", "a", "2", "b", "3", "c"]).await;
    assert_eq!(ctx.cmd(&["ZRANK", "z", "a"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["ZRANK", "z", "c"]).await, Reply::Integer(2));
    assert_eq!(ctx.cmd(&["ZREVRANK", "z", "c"]).await, Reply::Integer(0));
}

#[tokio::test]
async fn zrem_and_zcard_track_membership() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["ZADD", "z", "1", "a", "2", "b"]).await;
    assert_eq!(ctx.cmd(&["ZCARD", "z"]).await, Reply::Integer(2));
    assert_eq!(ctx.cmd(&["ZREM", "z", "a"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["ZCARD", "z"]).await, Reply::Integer(1));
}

#[tokio::test]
async fn zpopmin_returns_lowest_score_member_pair() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["ZADD", "z", "3", "c", "1", "a", "2", "b"]).await;
    assert_eq!(
        ctx.cmd(&["ZPOPMIN", "z"]).await,
        Reply::Array(vec![bulk("a"), bulk("1")])
    );
}

#[tokio::test]
async fn zcount_counts_members_in_score_range() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["ZADD", "z", "1", "a", "2", "b", "3", "c"]).await;
    assert_eq!(ctx.cmd(&["ZCOUNT", "z", "2", "3"]).await, Reply::Integer(2));
}
