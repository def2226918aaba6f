//! # relaymq
//!
//! `relaymq` is a minimalist, in-memory publish/subscribe broker built with Rust.
//! It serves producers and consumers over HTTP/WebSocket or gRPC, and can also
//! run as a thin proxy that fans calls out to a remote broker cluster.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `broker`: the engine that manages topics, subscribers and message fan-out,
//!   in local mode or as a proxy over a cluster.
//! - `client`: the cluster client — server resolution, selection strategies and
//!   the wire transports used to reach remote brokers.
//! - `config`: loading and merging of server configuration.
//! - `persistence`: best-effort append-only logging of published payloads.
//! - `transport`: the HTTP/WebSocket and gRPC server adapters.
//! - `utils`: shared utilities — the error taxonomy and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;

/// Generated gRPC bindings for the `MessageQueue` wire contract.
pub mod proto {
    tonic::include_proto!("relaymq");
}
