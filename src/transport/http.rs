use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::{
    broker::{Broker, SubscriptionStream},
    transport::message::CodeMsg,
    utils::error::{BrokerError, ServerError},
};

/// Optional WebSocket-upgrade extractor.
///
/// axum 0.8 removed the blanket `Option<T>` extractor impl (it now requires
/// `T: OptionalFromRequestParts`, which `WebSocketUpgrade` does not implement),
/// and the orphan rule forbids implementing that foreign trait on the foreign
/// type here. This newtype restores the pre-0.8 `Option<WebSocketUpgrade>`
/// behaviour verbatim: `Some` when the request is a WebSocket upgrade, `None`
/// otherwise.
struct OptionalWsUpgrade(Option<WebSocketUpgrade>);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for OptionalWsUpgrade {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalWsUpgrade(
            WebSocketUpgrade::from_request_parts(parts, state).await.ok(),
        ))
    }
}

#[derive(Clone)]
struct AppState {
    broker: Arc<Broker>,
}

#[derive(Debug, Deserialize)]
struct TopicQuery {
    topic: String,
}

/// Routes of the HTTP/WebSocket transport. Exposed separately from
/// [`serve`] so tests can run the router on an ephemeral port.
pub fn router(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/pub", get(publish_socket).post(publish_body))
        .route("/sub", get(subscribe))
        .with_state(AppState { broker })
}

/// Serves the HTTP/WebSocket transport on `addr` until the process exits,
/// with TLS when a certificate/key pair is configured.
pub async fn serve(
    addr: &str,
    tls: Option<(String, String)>,
    broker: Arc<Broker>,
) -> Result<(), ServerError> {
    let app = router(broker);
    let addr: SocketAddr = addr.parse().map_err(|source| ServerError::Addr {
        addr: addr.to_string(),
        source,
    })?;

    match tls {
        Some((cert, key)) => {
            let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
            info!(%addr, "http transport listening (tls)");
            axum_server::bind_rustls(addr, config)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(addr).await?;
            info!(%addr, "http transport listening");
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

fn failure_status(err: &BrokerError) -> StatusCode {
    match err {
        BrokerError::EngineClosed => StatusCode::SERVICE_UNAVAILABLE,
        BrokerError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        BrokerError::Cluster(_) => StatusCode::BAD_GATEWAY,
    }
}

fn failure_response(err: BrokerError) -> Response {
    let status = failure_status(&err);
    warn!(%err, "request failed");
    (status, Json(CodeMsg::error(status.as_u16(), err.to_string()))).into_response()
}

/// `POST /pub?topic=` — the raw request body is one payload.
async fn publish_body(
    State(state): State<AppState>,
    Query(query): Query<TopicQuery>,
    body: Bytes,
) -> Response {
    match state.broker.publish(&query.topic, body).await {
        Ok(()) => (StatusCode::OK, Json(CodeMsg::ok())).into_response(),
        Err(err) => failure_response(err),
    }
}

/// `GET /pub?topic=` with a WebSocket upgrade — every inbound frame is one
/// publish.
async fn publish_socket(
    State(state): State<AppState>,
    Query(query): Query<TopicQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| publish_frames(state.broker, query.topic, socket))
}

async fn publish_frames(broker: Arc<Broker>, topic: String, mut socket: WebSocket) {
    while let Some(frame) = socket.recv().await {
        let payload = match frame {
            Ok(WsMessage::Binary(payload)) => payload,
            Ok(WsMessage::Text(text)) => Bytes::from(text.to_string()),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!(%err, "publish socket error");
                break;
            }
        };
        if let Err(err) = broker.publish(&topic, payload).await {
            warn!(%err, %topic, "publish from socket failed");
        }
    }
    debug!(%topic, "publish socket closed");
}

/// `GET /sub?topic=` — a WebSocket upgrade streams one frame per payload;
/// without an upgrade the response is a long-lived stream of raw payload
/// bytes. Either way, disconnecting unsubscribes.
async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<TopicQuery>,
    OptionalWsUpgrade(ws): OptionalWsUpgrade,
) -> Response {
    let sub = match state.broker.subscribe(&query.topic).await {
        Ok(sub) => sub,
        Err(err) => return failure_response(err),
    };
    info!(topic = %query.topic, subscriber = %sub.id(), "subscribed");
    let stream = SubscriptionStream::new(state.broker.clone(), sub);

    match ws {
        Some(ws) => ws.on_upgrade(move |socket| subscribe_frames(stream, socket)),
        None => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Body::from_stream(stream.map(Ok::<_, Infallible>)),
        )
            .into_response(),
    }
}

async fn subscribe_frames(mut stream: SubscriptionStream, mut socket: WebSocket) {
    loop {
        tokio::select! {
            payload = stream.next() => match payload {
                Some(payload) => {
                    if socket.send(WsMessage::Binary(payload)).await.is_err() {
                        break;
                    }
                }
                None => {
                    // Engine closed the subscription from its side.
                    let _ = socket.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            // Drain the socket so pings and client close are handled.
            inbound = socket.recv() => match inbound {
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
    // Dropping the stream releases the registration.
}
