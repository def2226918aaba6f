//! The `client` module is the cluster-facing half of the broker.
//!
//! It turns a configured server list into concrete addresses (`resolver`),
//! picks which members participate in a call (`selector`) and talks to them
//! over a pluggable wire transport (`http`, `grpc`). `ClusterClient` ties
//! the three together with bounded retries and stream merging, and is what
//! the broker engine drives in proxy mode.

pub mod cluster;
pub mod grpc;
pub mod http;
pub mod resolver;
pub mod selector;

pub use cluster::ClusterClient;
pub use resolver::{DnsResolver, IpResolver, Resolver};
pub use selector::{All, Selector, Shard};


use std::{fmt, pin::Pin};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::utils::error::TransportError;

/// A resolved cluster member endpoint (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerAddress(String);

impl ServerAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live payload stream from one remote subscribe call.
pub type RemoteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// A wire transport able to reach one remote broker.
///
/// Implementations are chosen once at startup from configuration and never
/// switched at runtime.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes one payload to the broker at `addr`.
    async fn publish(
        &self,
        addr: &ServerAddress,
        topic: &str,
        payload: Bytes,
    ) -> Result<(), TransportError>;

    /// Opens a subscribe stream against the broker at `addr`.
    async fn subscribe(
        &self,
        addr: &ServerAddress,
        topic: &str,
    ) -> Result<RemoteStream, TransportError>;
}
