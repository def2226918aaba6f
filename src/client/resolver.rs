use async_trait::async_trait;
use tokio::net::lookup_host;
use tracing::warn;

use crate::client::ServerAddress;

/// Turns the configured server list into a concrete set of addresses.
///
/// A failing entry is logged and skipped rather than failing the whole call;
/// partial cluster visibility beats total failure. An empty result is
/// reported by the cluster client, not here.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, servers: &[String]) -> Vec<ServerAddress>;
}

/// Uses the configured `host:port` entries verbatim.
pub struct IpResolver;

#[async_trait]
impl Resolver for IpResolver {
    async fn resolve(&self, servers: &[String]) -> Vec<ServerAddress> {
        servers
            .iter()
            .map(|entry| entry.trim())
            .filter(|entry| {
                if is_host_port(entry) {
                    true
                } else {
                    warn!(entry, "skipping malformed server entry");
                    false
                }
            })
            .map(ServerAddress::new)
            .collect()
    }
}

/// Expands each configured entry through DNS on every call.
///
/// No caching: membership changes are picked up without a restart.
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, servers: &[String]) -> Vec<ServerAddress> {
        let mut out = Vec::new();
        for entry in servers {
            let entry = entry.trim();
            match lookup_host(entry).await {
                Ok(addrs) => out.extend(addrs.map(|a| ServerAddress::new(a.to_string()))),
                Err(err) => warn!(entry, %err, "skipping unresolvable server entry"),
            }
        }
        out
    }
}

fn is_host_port(entry: &str) -> bool {
    match entry.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
