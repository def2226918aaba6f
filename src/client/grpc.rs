use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::{
    client::{RemoteStream, ServerAddress, Transport},
    proto::{message_queue_client::MessageQueueClient, PublishRequest, SubscribeRequest},
    utils::error::TransportError,
};

/// gRPC wire transport over the `MessageQueue` service.
pub struct GrpcTransport;

impl GrpcTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GrpcTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn endpoint(addr: &ServerAddress) -> String {
    format!("http://{addr}")
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn publish(
        &self,
        addr: &ServerAddress,
        topic: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let mut client = MessageQueueClient::connect(endpoint(addr)).await?;
        client
            .publish(PublishRequest {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            })
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        addr: &ServerAddress,
        topic: &str,
    ) -> Result<RemoteStream, TransportError> {
        let mut client = MessageQueueClient::connect(endpoint(addr)).await?;
        let stream = client
            .subscribe(SubscribeRequest {
                topic: topic.to_string(),
            })
            .await?
            .into_inner();

        let stream = stream.map(|item| match item {
            Ok(resp) => Ok(Bytes::from(resp.payload)),
            Err(status) => Err(TransportError::RpcStatus(status)),
        });
        Ok(Box::pin(stream))
    }
}
