use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    broker::topic::{SubscriberId, Subscription, TopicRegistry},
    client::cluster::ClusterClient,
    persistence::FileLog,
    utils::error::BrokerError,
};

/// The process-wide broker engine.
///
/// Constructed once at startup in one of two modes and handed to every
/// transport adapter as an `Arc<Broker>`:
///
/// - **local**: owns a [`TopicRegistry`] (with optional persistence) and
///   serves every call in-process;
/// - **proxy**: owns a [`ClusterClient`] and forwards every call to a remote
///   cluster.
///
/// The mode is invisible to callers; `publish`/`subscribe`/`unsubscribe`/
/// `close` have the same signatures and error kinds either way.
pub struct Broker {
    mode: Mode,
    buffer: usize,
    closed: AtomicBool,
}

enum Mode {
    Local(TopicRegistry),
    Proxy {
        client: ClusterClient,
        // Live remote subscriptions; close() cancels every one of them.
        subs: Mutex<HashMap<SubscriberId, CancellationToken>>,
    },
}

impl Broker {
    /// A standalone broker serving from its own topic registry. `buffer` is
    /// the per-subscriber delivery channel capacity.
    pub fn local(log: Option<FileLog>, buffer: usize) -> Self {
        Self {
            mode: Mode::Local(TopicRegistry::new(log)),
            buffer,
            closed: AtomicBool::new(false),
        }
    }

    /// A stateless proxy forwarding every call to a remote cluster.
    pub fn proxy(client: ClusterClient, buffer: usize) -> Self {
        Self {
            mode: Mode::Proxy {
                client,
                subs: Mutex::new(HashMap::new()),
            },
            buffer,
            closed: AtomicBool::new(false),
        }
    }

    /// Publishes `payload` under `topic`.
    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::EngineClosed);
        }
        match &self.mode {
            Mode::Local(registry) => registry.publish(topic, &payload),
            Mode::Proxy { client, .. } => {
                client.publish(topic, payload).await.map_err(Into::into)
            }
        }
    }

    /// Opens a subscription on `topic`. In proxy mode this opens one remote
    /// stream per selected cluster member and merges them.
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::EngineClosed);
        }
        match &self.mode {
            Mode::Local(registry) => registry.register(topic, self.buffer),
            Mode::Proxy { client, subs } => {
                let (rx, cancel) = client.subscribe(topic, self.buffer).await?;
                let id = Uuid::new_v4();
                subs.lock().unwrap().insert(id, cancel.clone());
                // Close may have run while the remote streams were opening;
                // nothing may outlive it.
                if self.closed.load(Ordering::SeqCst) {
                    subs.lock().unwrap().remove(&id);
                    cancel.cancel();
                    return Err(BrokerError::EngineClosed);
                }
                Ok(Subscription::new(topic.to_string(), id, rx))
            }
        }
    }

    /// Tears down one subscription. Idempotent; unknown ids are a no-op.
    pub fn unsubscribe(&self, topic: &str, id: SubscriberId) {
        match &self.mode {
            Mode::Local(registry) => registry.deregister(topic, id),
            Mode::Proxy { subs, .. } => {
                if let Some(cancel) = subs.lock().unwrap().remove(&id) {
                    cancel.cancel();
                }
            }
        }
    }

    /// Closes the engine: every subscriber channel closes, every remote
    /// stream cancels, and subsequent calls fail with `EngineClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        match &self.mode {
            Mode::Local(registry) => registry.close(),
            Mode::Proxy { subs, .. } => {
                for (_, cancel) in subs.lock().unwrap().drain() {
                    cancel.cancel();
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> Option<&TopicRegistry> {
        match &self.mode {
            Mode::Local(registry) => Some(registry),
            Mode::Proxy { .. } => None,
        }
    }
}

/// Stream adapter over a [`Subscription`] that unsubscribes when dropped.
///
/// Used by the server adapters for long-lived response streams, so a client
/// disconnect always releases the registration.
pub struct SubscriptionStream {
    broker: Arc<Broker>,
    sub: Option<Subscription>,
}

impl SubscriptionStream {
    pub fn new(broker: Arc<Broker>, sub: Subscription) -> Self {
        Self {
            broker,
            sub: Some(sub),
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().sub.as_mut() {
            Some(sub) => sub.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        if let Some(sub) = self.sub.take() {
            self.broker.unsubscribe(sub.topic(), sub.id());
        }
    }
}
