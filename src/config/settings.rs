use clap::ValueEnum;
use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// A built `Settings` value is an immutable snapshot: the core consumes it
/// through constructors at startup and never re-reads configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub cluster: ClusterSettings,
}

/// Listener settings for the serving transport.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// `host:port` to bind.
    pub address: String,
    /// TLS certificate file; TLS is enabled when both files are set.
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    /// Which wire transport to serve (and, in proxy mode, to dial with).
    pub transport: TransportKind,
}

/// Engine settings.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    /// Append published payloads to per-topic `<topic>.mq` files.
    pub persist: bool,
    pub persist_dir: String,
    /// Capacity of each subscriber's delivery channel.
    pub buffer_size: usize,
}

/// Cluster-client settings, used when proxy mode is enabled.
#[derive(Debug, Deserialize, Clone)]
pub struct ClusterSettings {
    pub proxy: bool,
    /// Configured server list; what an entry means depends on the resolver.
    pub servers: Vec<String>,
    /// Additional attempts per server after the first failure.
    pub retries: u32,
    pub selector: SelectorKind,
    pub resolver: ResolverKind,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Grpc,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    All,
    Shard,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    Ip,
    Dns,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub cluster: Option<PartialClusterSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub address: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub transport: Option<TransportKind>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub persist: Option<bool>,
    pub persist_dir: Option<String>,
    pub buffer_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClusterSettings {
    pub proxy: Option<bool>,
    pub servers: Option<Vec<String>>,
    pub retries: Option<u32>,
    pub selector: Option<SelectorKind>,
    pub resolver: Option<ResolverKind>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                address: "127.0.0.1:8081".to_string(),
                cert_file: None,
                key_file: None,
                transport: TransportKind::Http,
            },
            broker: BrokerSettings {
                persist: false,
                persist_dir: ".".to_string(),
                buffer_size: 1024,
            },
            cluster: ClusterSettings {
                proxy: false,
                servers: Vec::new(),
                retries: 1,
                selector: SelectorKind::All,
                resolver: ResolverKind::Ip,
            },
        }
    }
}
