use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::{
        grpc::GrpcTransport, http::HttpTransport, All, DnsResolver, IpResolver, RemoteStream,
        Resolver, Selector, ServerAddress, Shard, Transport,
    },
    config::{ClusterSettings, ResolverKind, SelectorKind, TransportKind},
    utils::error::{ClusterError, TransportError},
};

/// Client side of a broker cluster: resolves the configured servers, selects
/// the members participating in a call and drives the wire transport against
/// them with bounded retries.
///
/// All strategy objects are fixed at construction; re-resolution happens on
/// every call, never by mutating the client.
pub struct ClusterClient {
    servers: Vec<String>,
    resolver: Box<dyn Resolver>,
    selector: Box<dyn Selector>,
    transport: Arc<dyn Transport>,
    retries: u32,
}

impl ClusterClient {
    /// Builds a client from settings, choosing resolver, selector and wire
    /// transport once.
    pub fn new(settings: &ClusterSettings, transport: TransportKind) -> Self {
        let resolver: Box<dyn Resolver> = match settings.resolver {
            ResolverKind::Dns => Box::new(DnsResolver),
            ResolverKind::Ip => Box::new(IpResolver),
        };
        let selector: Box<dyn Selector> = match settings.selector {
            SelectorKind::Shard => Box::new(Shard),
            SelectorKind::All => Box::new(All),
        };
        let transport: Arc<dyn Transport> = match transport {
            TransportKind::Grpc => Arc::new(GrpcTransport::new()),
            TransportKind::Http => Arc::new(HttpTransport::new()),
        };
        Self::with_parts(
            settings.servers.clone(),
            resolver,
            selector,
            transport,
            settings.retries,
        )
    }

    /// Assembles a client from explicit parts. Used directly by tests.
    pub fn with_parts(
        servers: Vec<String>,
        resolver: Box<dyn Resolver>,
        selector: Box<dyn Selector>,
        transport: Arc<dyn Transport>,
        retries: u32,
    ) -> Self {
        Self {
            servers,
            resolver,
            selector,
            transport,
            retries,
        }
    }

    /// Publishes to every selected server in parallel.
    ///
    /// Each server's call is retried up to the configured retry count against
    /// that same server. Succeeds only if every selected server eventually
    /// succeeds; otherwise the per-server failures are aggregated into a
    /// `ClusterError::Publish`.
    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ClusterError> {
        let targets = self.targets(topic).await?;
        let total = targets.len();

        let results = join_all(targets.into_iter().map(|addr| {
            let payload = payload.clone();
            async move {
                let res = self.publish_to(&addr, topic, payload).await;
                (addr, res)
            }
        }))
        .await;

        let failures: Vec<(ServerAddress, TransportError)> = results
            .into_iter()
            .filter_map(|(addr, res)| res.err().map(|err| (addr, err)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClusterError::Publish { total, failures })
        }
    }

    /// Opens a subscribe stream to every selected server and merges them into
    /// one bounded channel owned by the caller.
    ///
    /// Fails with `ClusterError::Subscribe` only when every stream fails to
    /// open. Cancelling the returned token tears down every forwarding task.
    pub async fn subscribe(
        &self,
        topic: &str,
        buffer: usize,
    ) -> Result<(mpsc::Receiver<Bytes>, CancellationToken), ClusterError> {
        let targets = self.targets(topic).await?;
        let total = targets.len();

        let opened = join_all(targets.into_iter().map(|addr| async move {
            let res = self.open_stream(&addr, topic).await;
            (addr, res)
        }))
        .await;

        let mut streams = Vec::new();
        let mut failures = Vec::new();
        for (addr, res) in opened {
            match res {
                Ok(stream) => streams.push((addr, stream)),
                Err(err) => {
                    warn!(%addr, %err, "dropping server from subscribe fan-in");
                    failures.push((addr, err));
                }
            }
        }
        if streams.is_empty() {
            return Err(ClusterError::Subscribe { total, failures });
        }

        let (tx, rx) = mpsc::channel(buffer);
        let cancel = CancellationToken::new();
        for (addr, stream) in streams {
            tokio::spawn(forward_stream(
                self.transport.clone(),
                addr,
                topic.to_string(),
                stream,
                tx.clone(),
                cancel.clone(),
                self.retries,
            ));
        }
        Ok((rx, cancel))
    }

    /// Resolve, then select. Neither step is retried: an empty result here is
    /// a configuration/membership problem, not a transient fault.
    async fn targets(&self, topic: &str) -> Result<Vec<ServerAddress>, ClusterError> {
        let resolved = self.resolver.resolve(&self.servers).await;
        if resolved.is_empty() {
            return Err(ClusterError::Resolution);
        }
        let selected = self.selector.select(&resolved, topic);
        if selected.is_empty() {
            return Err(ClusterError::Selection {
                topic: topic.to_string(),
            });
        }
        Ok(selected)
    }

    async fn publish_to(
        &self,
        addr: &ServerAddress,
        topic: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let mut last = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                debug!(%addr, attempt, "retrying publish");
            }
            match self.transport.publish(addr, topic, payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(%addr, %err, "publish attempt failed");
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or(TransportError::StreamClosed))
    }

    async fn open_stream(
        &self,
        addr: &ServerAddress,
        topic: &str,
    ) -> Result<RemoteStream, TransportError> {
        let mut last = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                debug!(%addr, attempt, "retrying subscribe");
            }
            match self.transport.subscribe(addr, topic).await {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    warn!(%addr, %err, "subscribe attempt failed");
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or(TransportError::StreamClosed))
    }
}

/// Forwards one server's stream into the merged channel until cancellation.
///
/// A broken stream is reopened up to `retries` times; after that the server
/// is dropped from the merge without affecting the other streams.
async fn forward_stream(
    transport: Arc<dyn Transport>,
    addr: ServerAddress,
    topic: String,
    mut stream: RemoteStream,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    retries: u32,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            item = stream.next() => match item {
                Some(Ok(payload)) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = tx.send(payload) => {
                            if sent.is_err() {
                                // Merged receiver gone; subscription is over.
                                return;
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(%addr, %err, "subscribe stream error");
                    match reopen(&*transport, &addr, &topic, retries, &cancel).await {
                        Some(next) => stream = next,
                        None => {
                            warn!(%addr, "dropping server from subscribe fan-in");
                            return;
                        }
                    }
                }
                None => {
                    debug!(%addr, "subscribe stream ended");
                    match reopen(&*transport, &addr, &topic, retries, &cancel).await {
                        Some(next) => stream = next,
                        None => return,
                    }
                }
            }
        }
    }
}

async fn reopen(
    transport: &dyn Transport,
    addr: &ServerAddress,
    topic: &str,
    retries: u32,
    cancel: &CancellationToken,
) -> Option<RemoteStream> {
    for attempt in 1..=retries {
        if cancel.is_cancelled() {
            return None;
        }
        match transport.subscribe(addr, topic).await {
            Ok(stream) => return Some(stream),
            Err(err) => warn!(%addr, attempt, %err, "subscribe reopen failed"),
        }
    }
    None
}
