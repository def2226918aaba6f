use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc::error::TryRecvError;

use super::{Broker, SubscriptionStream, TopicRegistry};
use crate::{persistence::FileLog, utils::error::BrokerError};

fn payload(s: &str) -> Bytes {
    Bytes::from(s.to_string())
}

#[test]
fn test_register_and_deregister() {
    let registry = TopicRegistry::new(None);
    let sub = registry.register("orders", 8).unwrap();
    assert_eq!(sub.topic(), "orders");
    assert_eq!(registry.subscriber_count("orders"), 1);

    registry.deregister("orders", sub.id());
    assert_eq!(registry.subscriber_count("orders"), 0);
}

#[test]
fn test_fanout_delivers_to_all_in_order() {
    let registry = TopicRegistry::new(None);
    let mut subs = vec![
        registry.register("orders", 8).unwrap(),
        registry.register("orders", 8).unwrap(),
        registry.register("orders", 8).unwrap(),
    ];

    registry.publish("orders", &payload("a")).unwrap();
    registry.publish("orders", &payload("b")).unwrap();
    registry.publish("orders", &payload("c")).unwrap();

    for sub in &mut subs {
        assert_eq!(sub.try_recv().unwrap(), payload("a"));
        assert_eq!(sub.try_recv().unwrap(), payload("b"));
        assert_eq!(sub.try_recv().unwrap(), payload("c"));
        assert_eq!(sub.try_recv().unwrap_err(), TryRecvError::Empty);
    }
}

#[test]
fn test_slow_subscriber_is_isolated() {
    let registry = TopicRegistry::new(None);
    // S1 has room for two payloads only and never drains.
    let mut slow = registry.register("orders", 2).unwrap();
    let mut fast = registry.register("orders", 8).unwrap();

    registry.publish("orders", &payload("a")).unwrap();
    registry.publish("orders", &payload("b")).unwrap();
    registry.publish("orders", &payload("c")).unwrap();

    assert_eq!(slow.try_recv().unwrap(), payload("a"));
    assert_eq!(slow.try_recv().unwrap(), payload("b"));
    // "c" was dropped for the slow subscriber, not queued.
    assert_eq!(slow.try_recv().unwrap_err(), TryRecvError::Empty);

    assert_eq!(fast.try_recv().unwrap(), payload("a"));
    assert_eq!(fast.try_recv().unwrap(), payload("b"));
    assert_eq!(fast.try_recv().unwrap(), payload("c"));
}

#[test]
fn test_publish_without_subscribers_is_ok() {
    let registry = TopicRegistry::new(None);
    assert!(registry.publish("nobody", &payload("x")).is_ok());
}

#[test]
fn test_deregister_is_idempotent() {
    let registry = TopicRegistry::new(None);
    let sub = registry.register("orders", 8).unwrap();

    registry.deregister("orders", sub.id());
    registry.deregister("orders", sub.id());
    registry.deregister("other", sub.id());

    assert!(registry.publish("orders", &payload("x")).is_ok());
}

#[tokio::test]
async fn test_close_closes_every_subscriber() {
    let registry = TopicRegistry::new(None);
    let mut subs = vec![
        registry.register("a", 8).unwrap(),
        registry.register("a", 8).unwrap(),
        registry.register("b", 8).unwrap(),
    ];

    registry.close();

    for sub in &mut subs {
        assert_eq!(sub.recv().await, None);
    }
    assert!(matches!(
        registry.publish("a", &payload("x")),
        Err(BrokerError::EngineClosed)
    ));
    assert!(matches!(
        registry.register("a", 8),
        Err(BrokerError::EngineClosed)
    ));
    // Deregistering after close stays a no-op.
    registry.deregister("a", uuid::Uuid::new_v4());
}

#[test]
fn test_publish_appends_to_log_before_fanout() {
    let dir = tempfile::tempdir().unwrap();
    let log = FileLog::new(dir.path());
    let registry = TopicRegistry::new(Some(log));

    registry.publish("events", &payload("x")).unwrap();
    registry.publish("events", &payload("y")).unwrap();

    let contents = std::fs::read(dir.path().join("events.mq")).unwrap();
    assert_eq!(contents, b"xy");
}

#[test]
fn test_persistence_failure_does_not_gate_fanout() {
    let dir = tempfile::tempdir().unwrap();
    // A directory where the topic file should be makes the append fail.
    std::fs::create_dir(dir.path().join("events.mq")).unwrap();
    let registry = TopicRegistry::new(Some(FileLog::new(dir.path())));
    let mut sub = registry.register("events", 8).unwrap();

    let err = registry.publish("events", &payload("x")).unwrap_err();
    assert!(matches!(err, BrokerError::Persistence(_)));
    // Delivery still happened.
    assert_eq!(sub.try_recv().unwrap(), payload("x"));
}

#[tokio::test]
async fn test_engine_local_publish_subscribe() {
    let broker = Broker::local(None, 8);
    let mut sub = broker.subscribe("orders").await.unwrap();

    broker.publish("orders", payload("hello")).await.unwrap();
    assert_eq!(sub.recv().await, Some(payload("hello")));

    broker.unsubscribe(sub.topic(), sub.id());
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn test_engine_close_rejects_further_calls() {
    let broker = Broker::local(None, 8);
    let mut subs = vec![
        broker.subscribe("orders").await.unwrap(),
        broker.subscribe("orders").await.unwrap(),
        broker.subscribe("events").await.unwrap(),
    ];

    broker.close();
    assert!(broker.is_closed());

    for sub in &mut subs {
        assert_eq!(sub.recv().await, None);
    }
    assert!(matches!(
        broker.publish("orders", payload("x")).await,
        Err(BrokerError::EngineClosed)
    ));
    assert!(matches!(
        broker.subscribe("orders").await,
        Err(BrokerError::EngineClosed)
    ));
}

#[tokio::test]
async fn test_subscription_stream_yields_payloads() {
    let broker = Arc::new(Broker::local(None, 8));
    let sub = broker.subscribe("orders").await.unwrap();
    let mut stream = SubscriptionStream::new(broker.clone(), sub);

    broker.publish("orders", payload("a")).await.unwrap();
    assert_eq!(stream.next().await, Some(payload("a")));
}

#[tokio::test]
async fn test_subscription_stream_unsubscribes_on_drop() {
    let broker = Arc::new(Broker::local(None, 8));
    let sub = broker.subscribe("orders").await.unwrap();
    let registry = broker.registry().unwrap();
    assert_eq!(registry.subscriber_count("orders"), 1);

    drop(SubscriptionStream::new(broker.clone(), sub));
    assert_eq!(registry.subscriber_count("orders"), 0);
}
