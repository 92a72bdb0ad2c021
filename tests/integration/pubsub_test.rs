// tests/integration/pubsub_test.rs

//! Integration tests for pub/sub. Covers spec.md §8 property P9
//! ("Publish(c, m) returns the count of connections currently
//! subscribed to c; each of them receives exactly one message frame").

use bytes::Bytes;
use ridgekv::command::line::to_command_line;
use ridgekv::config::Config;
use ridgekv::connection::ConnectionState;
use ridgekv::reply::Reply;
use ridgekv::server::{NewConnection, Server};

#[tokio::test]
async fn p9_publish_returns_subscriber_count_and_each_gets_one_message() {
    let server = Server::new(Config::default(), None, None).unwrap();
    let NewConnection { mut state: sub_a, mut messages: rx_a } = server.new_connection();
    let NewConnection { mut state: sub_b, mut messages: rx_b } = server.new_connection();

    server.exec(&mut sub_a, &to_command_line(&["SUBSCRIBE", "news"])).await;
    server.exec(&mut sub_b, &to_command_line(&["SUBSCRIBE", "news"])).await;

    let mut publisher = ConnectionState::new();
    let r = server
        .exec(&mut publisher, &to_command_line(&["PUBLISH", "news", "hello"]))
        .await;
    assert_eq!(r, Reply::Integer(2));

    let msg_a = rx_a.recv().await.unwrap();
    let msg_b = rx_b.recv().await.unwrap();
    assert_eq!(msg_a.channel, Bytes::from_static(b"news"));
    assert_eq!(msg_a.payload, Bytes::from_static(b"hello"));
    assert_eq!(msg_b.payload, Bytes::from_static(b"hello"));

    server.disconnect(&sub_a).await;
    server.disconnect(&sub_b).await;
}

#[tokio::test]
async fn publish_to_a_channel_with_no_subscribers_returns_zero() {
    let server = Server::new(Config::default(), None, None).unwrap();
    let mut conn = ConnectionState::new();
    let r = server
        .exec(&mut conn, &to_command_line(&["PUBLISH", "silence", "anyone?"]))
        .await;
    assert_eq!(r, Reply::Integer(0));
}

#[tokio::test]
async fn unsubscribe_from_all_channels_with_no_argument() {
    let server = Server::new(Config::default(), None, None).unwrap();
    let NewConnection { mut state, .. } = server.new_connection();
    server
        .exec(&mut state, &to_command_line(&["SUBSCRIBE", "a", "b"]))
        .await;
    let r = server.exec(&mut state, &to_command_line(&["UNSUBSCRIBE"])).await;
    match r {
        Reply::Array(items) => assert_eq!(items.len(), 2),
        other => panic!("expected an array of per-channel unsubscribe confirmations, got {other:?}"),
    }
    server.disconnect(&state).await;
}
