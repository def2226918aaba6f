use std::{net::SocketAddr, pin::Pin, sync::Arc};

use bytes::Bytes;
use futures::Stream;
use futures_util::StreamExt;
use tonic::{
    transport::{Identity, Server, ServerTlsConfig},
    Request, Response, Status,
};
use tracing::{debug, info};

use crate::{
    broker::{Broker, SubscriptionStream},
    proto::{
        message_queue_server::{MessageQueue, MessageQueueServer},
        PublishRequest, PublishResponse, SubscribeRequest, SubscribeResponse,
    },
    utils::error::{BrokerError, ServerError},
};

/// gRPC adapter over the broker engine.
pub struct MessageQueueService {
    broker: Arc<Broker>,
}

impl MessageQueueService {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

/// Wraps the adapter for registration with a tonic `Server`. Exposed so
/// tests can serve the service on an ephemeral listener.
pub fn service(broker: Arc<Broker>) -> MessageQueueServer<MessageQueueService> {
    MessageQueueServer::new(MessageQueueService::new(broker))
}

fn status_for(err: BrokerError) -> Status {
    match &err {
        BrokerError::EngineClosed => Status::unavailable(err.to_string()),
        BrokerError::Persistence(_) => Status::internal(err.to_string()),
        BrokerError::Cluster(_) => Status::unavailable(err.to_string()),
    }
}

#[tonic::async_trait]
impl MessageQueue for MessageQueueService {
    async fn publish(
        &self,
        request: Request<PublishRequest>,
    ) -> Result<Response<PublishResponse>, Status> {
        let req = request.into_inner();
        debug!(topic = %req.topic, "rpc publish");
        self.broker
            .publish(&req.topic, Bytes::from(req.payload))
            .await
            .map_err(status_for)?;
        Ok(Response::new(PublishResponse {}))
    }

    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<SubscribeResponse, Status>> + Send>>;

    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let req = request.into_inner();
        let sub = self.broker.subscribe(&req.topic).await.map_err(status_for)?;
        info!(topic = %req.topic, subscriber = %sub.id(), "rpc subscribe");

        let stream = SubscriptionStream::new(self.broker.clone(), sub).map(|payload| {
            Ok(SubscribeResponse {
                payload: payload.to_vec(),
            })
        });
        Ok(Response::new(Box::pin(stream)))
    }
}

/// Serves the gRPC transport on `addr` until the process exits, with TLS
/// when a certificate/key pair is configured.
pub async fn serve(
    addr: &str,
    tls: Option<(String, String)>,
    broker: Arc<Broker>,
) -> Result<(), ServerError> {
    let addr: SocketAddr = addr.parse().map_err(|source| ServerError::Addr {
        addr: addr.to_string(),
        source,
    })?;

    let mut builder = Server::builder();
    if let Some((cert, key)) = tls {
        let cert = tokio::fs::read(cert).await?;
        let key = tokio::fs::read(key).await?;
        builder = builder.tls_config(ServerTlsConfig::new().identity(Identity::from_pem(cert, key)))?;
        info!(%addr, "grpc transport listening (tls)");
    } else {
        info!(%addr, "grpc transport listening");
    }

    builder.add_service(service(broker)).serve(addr).await?;
    Ok(())
}
