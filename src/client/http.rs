use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message as WsMessage;

use crate::{
    client::{RemoteStream, ServerAddress, Transport},
    utils::error::TransportError,
};

/// HTTP wire transport: publish as a POST with the raw payload body,
/// subscribe over a WebSocket with one frame per payload.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn publish(
        &self,
        addr: &ServerAddress,
        topic: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let url = format!("http://{addr}/pub");
        let resp = self
            .http
            .post(&url)
            .query(&[("topic", topic)])
            .body(payload)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::HttpStatus(resp.status().as_u16()))
        }
    }

    async fn subscribe(
        &self,
        addr: &ServerAddress,
        topic: &str,
    ) -> Result<RemoteStream, TransportError> {
        let url = format!("ws://{addr}/sub?topic={topic}");
        let (ws, _) = connect_async(url.as_str()).await?;

        let stream = ws.filter_map(|item| async move {
            match item {
                Ok(WsMessage::Binary(payload)) => Some(Ok(payload)),
                Ok(WsMessage::Text(text)) => Some(Ok(Bytes::from(text.to_string()))),
                Err(err) => Some(Err(TransportError::WebSocket(err))),
                // Close and control frames end or keep the stream alive
                // without yielding payloads.
                Ok(_) => None,
            }
        });
        Ok(Box::pin(stream))
    }
}
