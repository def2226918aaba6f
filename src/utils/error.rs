//! The `error` module defines the error taxonomy used within the `relaymq`
//! application.
//!
//! Errors are grouped by the layer that produces them: the broker engine,
//! the persistence writer, the cluster client and the wire transports.
//! Every failure path returns one of these values to the caller; nothing
//! panics across the engine boundary.

use thiserror::Error;

use crate::client::ServerAddress;

/// Errors surfaced by the broker engine, in either local or proxy mode.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The engine has been closed; it stays unusable until process restart.
    #[error("broker engine is closed")]
    EngineClosed,

    /// A best-effort persistence append failed. Fan-out has already run when
    /// this is returned.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A cluster call failed in proxy mode.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Failure to append a payload to a topic's log file.
#[derive(Debug, Error)]
#[error("append to log for topic {topic:?} failed: {source}")]
pub struct PersistenceError {
    pub topic: String,
    #[source]
    pub source: std::io::Error,
}

/// Errors produced by the cluster client, fatal to the single call only.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The resolver produced no usable server addresses.
    #[error("no cluster servers resolved")]
    Resolution,

    /// The selector returned an empty subset.
    #[error("no cluster server selected for topic {topic:?}")]
    Selection { topic: String },

    /// At least one selected server failed after exhausting retries.
    #[error("cluster publish failed on {}/{total} servers: {}", .failures.len(), fmt_failures(.failures))]
    Publish {
        total: usize,
        failures: Vec<(ServerAddress, TransportError)>,
    },

    /// Every subscribe stream failed to open.
    #[error("cluster subscribe failed on all {total} servers: {}", fmt_failures(.failures))]
    Subscribe {
        total: usize,
        failures: Vec<(ServerAddress, TransportError)>,
    },
}

impl ClusterError {
    /// Per-server failures carried by a publish or subscribe error.
    pub fn failures(&self) -> &[(ServerAddress, TransportError)] {
        match self {
            ClusterError::Publish { failures, .. } => failures,
            ClusterError::Subscribe { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn fmt_failures(failures: &[(ServerAddress, TransportError)]) -> String {
    failures
        .iter()
        .map(|(addr, err)| format!("{addr}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Wire-level errors from a single remote call or stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    HttpStatus(u16),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("rpc connection failed: {0}")]
    Rpc(#[from] tonic::transport::Error),

    #[error("rpc call failed: {0}")]
    RpcStatus(#[from] tonic::Status),

    #[error("remote stream closed")]
    StreamClosed,
}

/// Errors from the server adapters' listen/serve path.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address {addr:?}: {source}")]
    Addr {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("rpc server error: {0}")]
    Rpc(#[from] tonic::transport::Error),
}
