// tests/integration/transaction_test.rs

//! Integration tests for MULTI/EXEC/DISCARD/WATCH/UNWATCH. Covers
//! spec.md §8 scenario S5 and properties P4 (WATCH correctness) and P6
//! (rollback restores pre-MULTI state).

use super::test_helpers::TestContext;
use bytes::Bytes;
use ridgekv::command::line::to_command_line;
use ridgekv::config::Config;
use ridgekv::connection::ConnectionState;
use ridgekv::reply::Reply;
use ridgekv::server::Server;

#[tokio::test]
async fn s5_exec_commits_when_watched_key_is_untouched() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["WATCH", "k"]).await;
    ctx.cmd(&["MULTI"]).await;
    assert_eq!(ctx.cmd(&["SET", "k", "2"]).await, Reply::queued());
    assert_eq!(ctx.cmd(&["EXEC"]).await, Reply::Array(vec![Reply::ok()]));
    assert_eq!(ctx.cmd(&["GET", "k"]).await, Reply::Bulk(Bytes::from_static(b"2")));
}

#[tokio::test]
async fn s5_exec_returns_null_array_when_a_concurrent_write_changed_the_watched_key() {
    // Two independent connections against the *same* server, the way
    // two real clients interleave against one database.
    let server = Server::new(Config::default(), None, None).unwrap();
    let mut watcher = ConnectionState::new();
    let mut writer = ConnectionState::new();

    server.exec(&mut watcher, &to_command_line(&["WATCH", "k"])).await;
    server.exec(&mut writer, &to_command_line(&["SET", "k", "1"])).await;

    server.exec(&mut watcher, &to_command_line(&["MULTI"])).await;
    server.exec(&mut watcher, &to_command_line(&["SET", "k", "2"])).await;
    let exec_reply = server.exec(&mut watcher, &to_command_line(&["EXEC"])).await;
    assert_eq!(exec_reply, Reply::NullArray);

    let get_reply = server.exec(&mut watcher, &to_command_line(&["GET", "k"])).await;
    assert_eq!(get_reply, Reply::Bulk(Bytes::from_static(b"1")));
}

#[tokio::test]
async fn discard_drops_the_queue_without_running_anything() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "orig"]).await;
    ctx.cmd(&["MULTI"]).await;
    ctx.cmd(&["SET", "k", "changed"]).await;
    assert_eq!(ctx.cmd(&["DISCARD"]).await, Reply::ok());
    assert_eq!(ctx.cmd(&["GET", "k"]).await, Reply::Bulk(Bytes::from_static(b"orig")));
}

#[tokio::test]
async fn exec_without_multi_is_an_error() {
    let mut ctx = TestContext::new().await;
    assert!(ctx.cmd(&["EXEC"]).await.is_error());
}

#[tokio::test]
async fn nested_multi_is_rejected() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["MULTI"]).await;
    assert!(ctx.cmd(&["MULTI"]).await.is_error());
    ctx.cmd(&["DISCARD"]).await;
}

#[tokio::test]
async fn p6_rollback_restores_every_key_the_transaction_touched() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "a", "orig-a"]).await;
    ctx.cmd(&["SET", "b", "orig-b"]).await;

    ctx.cmd(&["MULTI"]).await;
    ctx.cmd(&["SET", "a", "changed-a"]).await;
    ctx.cmd(&["SET", "b", "changed-b"]).await;
    // INCR on a non-integer string fails, aborting the transaction.
    ctx.cmd(&["INCR", "a"]).await;
    assert!(ctx.cmd(&["EXEC"]).await.is_error());

    assert_eq!(ctx.cmd(&["GET", "a"]).await, Reply::Bulk(Bytes::from_static(b"orig-a")));
    assert_eq!(ctx.cmd(&["GET", "b"]).await, Reply::Bulk(Bytes::from_static(b"orig-b")));
}

#[tokio::test]
async fn unwatch_clears_the_watch_set_so_a_later_write_does_not_abort_exec() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["SET", "k", "1"]).await;
    ctx.cmd(&["WATCH", "k"]).await;
    ctx.cmd(&["UNWATCH"]).await;
    ctx.cmd(&["SET", "k", "2"]).await;
    ctx.cmd(&["MULTI"]).await;
    ctx.cmd(&["SET", "k", "3"]).await;
    assert_eq!(ctx.cmd(&["EXEC"]).await, Reply::Array(vec![Reply::ok()]));
}

#[tokio::test]
async fn unknown_command_queued_in_multi_forces_execabort() {
    let mut ctx = TestContext::new().await;
    ctx.cmd(&["MULTI"]).await;
    assert!(ctx.cmd(&["NOTACOMMAND"]).await.is_error());
    assert!(ctx.cmd(&["EXEC"]).await.is_error());
}
