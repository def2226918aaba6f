mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{
    BrokerSettings, ClusterSettings, ResolverKind, SelectorKind, ServerSettings, Settings,
    TransportKind,
};

/// Loads the configuration from the default file and environment variables
/// (`RELAYMQ_SERVER__ADDRESS`, ...), merges it over the built-in defaults and
/// returns a `Settings` snapshot.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("RELAYMQ").separator("__"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    Ok(Settings {
        server: ServerSettings {
            address: partial
                .server
                .as_ref()
                .and_then(|s| s.address.clone())
                .unwrap_or(default.server.address),
            cert_file: partial
                .server
                .as_ref()
                .and_then(|s| s.cert_file.clone())
                .or(default.server.cert_file),
            key_file: partial
                .server
                .as_ref()
                .and_then(|s| s.key_file.clone())
                .or(default.server.key_file),
            transport: partial
                .server
                .as_ref()
                .and_then(|s| s.transport)
                .unwrap_or(default.server.transport),
        },
        broker: BrokerSettings {
            persist: partial
                .broker
                .as_ref()
                .and_then(|b| b.persist)
                .unwrap_or(default.broker.persist),
            persist_dir: partial
                .broker
                .as_ref()
                .and_then(|b| b.persist_dir.clone())
                .unwrap_or(default.broker.persist_dir),
            buffer_size: partial
                .broker
                .as_ref()
                .and_then(|b| b.buffer_size)
                .unwrap_or(default.broker.buffer_size),
        },
        cluster: ClusterSettings {
            proxy: partial
                .cluster
                .as_ref()
                .and_then(|c| c.proxy)
                .unwrap_or(default.cluster.proxy),
            servers: partial
                .cluster
                .as_ref()
                .and_then(|c| c.servers.clone())
                .unwrap_or(default.cluster.servers),
            retries: partial
                .cluster
                .as_ref()
                .and_then(|c| c.retries)
                .unwrap_or(default.cluster.retries),
            selector: partial
                .cluster
                .as_ref()
                .and_then(|c| c.selector)
                .unwrap_or(default.cluster.selector),
            resolver: partial
                .cluster
                .as_ref()
                .and_then(|c| c.resolver)
                .unwrap_or(default.cluster.resolver),
        },
    })
}
