// tests/integration/string_commands_test.rs

//! Integration tests for string commands: SET/GET/DEL, INCR family,
//! APPEND/STRLEN, ranges, and bit operations. Covers spec.md §8
//! scenarios S1 and S2 literally.

use super::test_helpers::TestContext;
use bytes::Bytes;
use ridgekv::reply::Reply;

#[tokio::test]
async fn s1_set_get_del_get() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["SET", "foo", "bar"]).await, Reply::ok());
    assert_eq!(ctx.cmd(&["GET", "foo"]).await, Reply::Bulk(Bytes::from_static(b"bar")));
    assert_eq!(ctx.cmd(&["DEL", "foo"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["GET", "foo"]).await, Reply::NullBulk);
}

#[tokio::test]
async fn s2_incrby_rejects_non_integer_and_leaves_value_intact() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["SET", "n", "10"]).await, Reply::ok());
    assert_eq!(ctx.cmd(&["INCRBY", "n", "5"]).await, Reply::Integer(15));
    assert!(ctx.cmd(&["INCRBY", "n", "xyz"]).await.is_error());
    assert_eq!(ctx.cmd(&["GET", "n"]).await, Reply::Bulk(Bytes::from_static(b"15")));
}

#[tokio::test]
async fn setnx_only_sets_when_absent() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["SETNX", "k", "first"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["SETNX", "k", "second"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["GET", "k"]).await, Reply::Bulk(Bytes::from_static(b"first")));
}

#[tokio::test]
async fn mset_mget_roundtrip() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["MSET", "a", "1", "b", "2"]).await, Reply::ok());
    assert_eq!(
        ctx.cmd(&["MGET", "a", "b", "missing"]).await,
        Reply::Array(vec![
            Reply::Bulk(Bytes::from_static(b"1")),
            Reply::Bulk(Bytes::from_static(b"2")),
            Reply::NullBulk,
        ])
    );
}

#[tokio::test]
async fn append_extends_and_strlen_reports_new_length() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["APPEND", "k", "Hello "]).await, Reply::Integer(6));
    assert_eq!(ctx.cmd(&["APPEND", "k", "World"]).await, Reply::Integer(11));
    assert_eq!(ctx.cmd(&["STRLEN", "k"]).await, Reply::Integer(11));
    assert_eq!(
        ctx.cmd(&["GET", "k"]).await,
        Reply::Bulk(Bytes::from_static(b"Hello World"))
    );
}

#[tokio::test]
async fn getrange_and_setrange() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "Hello World"]).await;
    assert_eq!(
        ctx.cmd(&["GETRANGE", "k", "0", "4"]).await,
        Reply::Bulk(Bytes::from_static(b"Hello"))
    );
    assert_eq!(
        ctx.cmd(&["GETRANGE", "k", "-5", "-1"]).await,
        Reply::Bulk(Bytes::from_static(b"World"))
    );
    ctx.cmd(&["SETRANGE", "k", "6", "Redis"]).await;
    assert_eq!(
        ctx.cmd(&["GET", "k"]).await,
        Reply::Bulk(Bytes::from_static(b"Hello Redis"))
    );
}

#[tokio::test]
async fn setbit_getbit_bitcount() {
    let mut ctx = TestContext::new().await;
    assert_eq!(ctx.cmd(&["SETBIT", "k", "7", "1"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["GETBIT", "k", "7"]).await, Reply::Integer(1));
    assert_eq!(ctx.cmd(&["GETBIT", "k", "6"]).await, Reply::Integer(0));
    assert_eq!(ctx.cmd(&["BITCOUNT", "k"]).await, Reply::Integer(1));
}

#[tokio::test]
async fn wrong_type_error_on_list_against_string_command() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["RPUSH", "k", "a"]).await;
    assert!(ctx.cmd(&["GET", "k"]).await.is_error());
    assert!(ctx.cmd(&["INCR", "k"]).await.is_error());
}

#[tokio::test]
async fn getdel_returns_value_and_removes_key() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "v"]).await;
    assert_eq!(ctx.cmd(&["GETDEL", "k"]).await, Reply::Bulk(Bytes::from_static(b"v")));
    assert_eq!(ctx.cmd(&["EXISTS", "k"]).await, Reply::Integer(0));
}
