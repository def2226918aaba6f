use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
    task::{Context, Poll},
};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::{persistence::FileLog, utils::error::BrokerError};

pub type SubscriberId = Uuid;

/// One active subscription, exclusively owned by the caller that created it.
///
/// The registry keeps only the sending half of the delivery channel; dropping
/// or deregistering the subscription closes it.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    id: SubscriberId,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub(crate) fn new(topic: String, id: SubscriberId, rx: mpsc::Receiver<Bytes>) -> Self {
        Self { topic, id, rx }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receives the next payload, or `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Bytes, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    pub(crate) fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

/// A topic and the delivery channels of its current subscribers.
#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Bytes>>,
}

impl Topic {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashMap::new(),
        }
    }

    fn subscribe(&mut self, id: SubscriberId, tx: mpsc::Sender<Bytes>) {
        self.subscribers.insert(id, tx);
    }

    /// Removes a subscriber. No effect if it was already removed.
    fn unsubscribe(&mut self, id: &SubscriberId) {
        self.subscribers.remove(id);
    }

    fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// The topic → subscriber-set mapping and the fan-out path.
///
/// The map is guarded by a single read/write lock: publishes take the read
/// lock so many fan-outs proceed concurrently, register/deregister take the
/// write lock. Delivery to each subscriber is non-blocking; a full channel
/// means that subscriber's copy is dropped so one slow consumer never stalls
/// the publisher or its peers.
#[derive(Debug)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, Topic>>,
    log: Option<FileLog>,
    closed: AtomicBool,
}

impl TopicRegistry {
    pub fn new(log: Option<FileLog>) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            log,
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a bounded-channel subscriber on `topic` and registers it.
    ///
    /// Fails only with `EngineClosed` after [`TopicRegistry::close`].
    pub fn register(&self, topic: &str, buffer: usize) -> Result<Subscription, BrokerError> {
        let (tx, rx) = mpsc::channel(buffer);
        let id = Uuid::new_v4();
        let mut topics = self.topics.write().unwrap();
        // Checked under the lock so a concurrent close cannot miss us.
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::EngineClosed);
        }
        topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(id, tx);
        Ok(Subscription::new(topic.to_string(), id, rx))
    }

    /// Removes the subscriber from the topic's set and closes its delivery
    /// channel. Idempotent, and safe to call concurrently with fan-out.
    pub fn deregister(&self, topic: &str, id: SubscriberId) {
        let mut topics = self.topics.write().unwrap();
        if let Some(t) = topics.get_mut(topic) {
            t.unsubscribe(&id);
            if t.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Appends to the topic's log (when persistence is enabled), then fans
    /// the payload out to every currently-registered subscriber.
    ///
    /// An append failure is returned as a `PersistenceError` but does not
    /// gate fan-out; delivery has already run when it is reported.
    pub fn publish(&self, topic: &str, payload: &Bytes) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::EngineClosed);
        }

        // Append before taking the registry lock; no lock is held across I/O.
        let persist_err = match &self.log {
            Some(log) => log.append(topic, payload).err(),
            None => None,
        };

        {
            let topics = self.topics.read().unwrap();
            if self.closed.load(Ordering::SeqCst) {
                return Err(BrokerError::EngineClosed);
            }
            if let Some(t) = topics.get(topic) {
                for (id, tx) in &t.subscribers {
                    match tx.try_send(payload.clone()) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!(subscriber = %id, topic, "subscriber buffer full, dropping payload");
                        }
                        // Receiver already gone; deregistration will prune it.
                        Err(mpsc::error::TrySendError::Closed(_)) => {}
                    }
                }
            }
        }

        match persist_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap()
            .get(topic)
            .map(|t| t.subscribers.len())
            .unwrap_or(0)
    }

    /// Deregisters and closes every subscriber across every topic. Further
    /// `publish`/`register` calls fail with `EngineClosed`.
    pub fn close(&self) {
        let mut topics = self.topics.write().unwrap();
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the senders closes each subscriber's channel.
        topics.clear();
    }
}
