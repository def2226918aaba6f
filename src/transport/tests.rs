use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message as WsMessage;

use crate::{
    broker::Broker,
    client::{grpc::GrpcTransport, ServerAddress, Transport},
    transport::{grpc, http, message::CodeMsg},
};

fn payload(s: &str) -> Bytes {
    Bytes::from(s.to_string())
}

async fn spawn_http(broker: Arc<Broker>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, http::router(broker)).await.unwrap();
    });
    addr.to_string()
}

async fn spawn_grpc(broker: Arc<Broker>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(grpc::service(broker))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr.to_string()
}

#[test]
fn test_code_msg_serialization() {
    let ok = serde_json::to_string(&CodeMsg::ok()).unwrap();
    assert_eq!(ok, r#"{"code":200}"#);

    let err: CodeMsg = serde_json::from_str(r#"{"code":503,"msg":"closed"}"#).unwrap();
    assert_eq!(err.code, 503);
    assert_eq!(err.msg.as_deref(), Some("closed"));
}

#[tokio::test]
async fn test_http_post_publish_reaches_ws_subscriber() {
    let broker = Arc::new(Broker::local(None, 8));
    let addr = spawn_http(broker.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/sub?topic=orders"))
        .await
        .unwrap();

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/pub"))
        .query(&[("topic", "orders")])
        .body("hello")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let envelope: CodeMsg = serde_json::from_slice(&resp.bytes().await.unwrap()).unwrap();
    assert_eq!(envelope.code, 200);

    let frame = ws.next().await.unwrap().unwrap();
    assert_eq!(frame.into_data(), payload("hello"));
}

#[tokio::test]
async fn test_ws_publish_frames() {
    let broker = Arc::new(Broker::local(None, 8));
    let addr = spawn_http(broker.clone()).await;
    let mut sub = broker.subscribe("orders").await.unwrap();

    let (mut ws, _) = connect_async(format!("ws://{addr}/pub?topic=orders"))
        .await
        .unwrap();
    ws.send(WsMessage::Binary(payload("fire"))).await.unwrap();

    assert_eq!(sub.recv().await.unwrap(), payload("fire"));
}

#[tokio::test]
async fn test_http_streaming_subscribe() {
    let broker = Arc::new(Broker::local(None, 8));
    let addr = spawn_http(broker.clone()).await;

    let resp = reqwest::get(format!("http://{addr}/sub?topic=events"))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let mut chunks = resp.bytes_stream();

    broker.publish("events", payload("x")).await.unwrap();
    assert_eq!(chunks.next().await.unwrap().unwrap(), payload("x"));
    broker.publish("events", payload("y")).await.unwrap();
    assert_eq!(chunks.next().await.unwrap().unwrap(), payload("y"));
}

#[tokio::test]
async fn test_ws_disconnect_unsubscribes() {
    let broker = Arc::new(Broker::local(None, 8));
    let addr = spawn_http(broker.clone()).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/sub?topic=orders"))
        .await
        .unwrap();
    let registry = broker.registry().unwrap();
    assert_eq!(registry.subscriber_count("orders"), 1);

    ws.close(None).await.unwrap();
    drop(ws);

    // Give the server loop a moment to observe the close.
    for _ in 0..100 {
        if registry.subscriber_count("orders") == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(registry.subscriber_count("orders"), 0);
}

#[tokio::test]
async fn test_http_publish_after_close_is_unavailable() {
    let broker = Arc::new(Broker::local(None, 8));
    let addr = spawn_http(broker.clone()).await;
    broker.close();

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/pub?topic=orders"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let envelope: CodeMsg = serde_json::from_slice(&resp.bytes().await.unwrap()).unwrap();
    assert_eq!(envelope.code, 503);
    assert!(envelope.msg.is_some());
}

#[tokio::test]
async fn test_grpc_publish_subscribe_roundtrip() {
    let broker = Arc::new(Broker::local(None, 8));
    let addr = spawn_grpc(broker.clone()).await;
    let server = ServerAddress::new(addr.as_str());

    let transport = GrpcTransport::new();
    let mut stream = transport.subscribe(&server, "orders").await.unwrap();
    transport
        .publish(&server, "orders", payload("rpc"))
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), payload("rpc"));
}
