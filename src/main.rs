use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{error, info, warn};

use relaymq::{
    broker::Broker,
    client::ClusterClient,
    config::{load_config, ResolverKind, SelectorKind, Settings, TransportKind},
    persistence::FileLog,
    transport,
    utils::{error::BrokerError, logging},
};

#[derive(Debug, Parser)]
#[command(name = "relaymq", about = "In-memory pub/sub broker, proxy and console client")]
struct Args {
    /// MQ server address
    #[arg(long)]
    address: Option<String>,

    /// TLS certificate file
    #[arg(long)]
    cert_file: Option<String>,

    /// TLS key file
    #[arg(long)]
    key_file: Option<String>,

    /// Persist messages to a <topic>.mq file per topic
    #[arg(long)]
    persist: bool,

    /// Proxy for an MQ cluster
    #[arg(long)]
    proxy: bool,

    /// Number of retries for publish or subscribe
    #[arg(long)]
    retries: Option<u32>,

    /// Comma separated MQ cluster list used by proxy and client modes
    #[arg(long)]
    servers: Option<String>,

    /// Run the MQ console client
    #[arg(long)]
    client: bool,

    /// Interactive client mode
    #[arg(short = 'i', long)]
    interactive: bool,

    /// Publish via the console client
    #[arg(long)]
    publish: bool,

    /// Subscribe via the console client
    #[arg(long)]
    subscribe: bool,

    /// Topic for the console client to publish or subscribe to
    #[arg(long)]
    topic: Option<String>,

    /// Server select strategy
    #[arg(long = "select", value_enum)]
    selector: Option<SelectorKind>,

    /// Server resolver for discovery
    #[arg(long, value_enum)]
    resolver: Option<ResolverKind>,

    /// Transport for communication
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn validate(args: &Args) -> Result<(), String> {
    if args.proxy && args.client {
        return Err("client and proxy flags cannot be specified together".into());
    }
    if args.client && args.topic.as_deref().is_none_or(str::is_empty) {
        return Err("topic not specified".into());
    }
    if args.client && !args.publish && !args.subscribe {
        return Err("specify whether to publish or subscribe".into());
    }
    Ok(())
}

fn apply_flags(mut settings: Settings, args: &Args) -> Settings {
    if let Some(address) = &args.address {
        settings.server.address = address.clone();
    }
    if let Some(cert_file) = &args.cert_file {
        settings.server.cert_file = Some(cert_file.clone());
    }
    if let Some(key_file) = &args.key_file {
        settings.server.key_file = Some(key_file.clone());
    }
    if let Some(transport) = args.transport {
        settings.server.transport = transport;
    }
    if args.persist {
        settings.broker.persist = true;
    }
    if args.proxy {
        settings.cluster.proxy = true;
    }
    if let Some(retries) = args.retries {
        settings.cluster.retries = retries;
    }
    if let Some(servers) = &args.servers {
        settings.cluster.servers = servers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(selector) = args.selector {
        settings.cluster.selector = selector;
    }
    if let Some(resolver) = args.resolver {
        settings.cluster.resolver = resolver;
    }
    settings
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(&args.log_level);

    if let Err(msg) = validate(&args) {
        error!("{msg}");
        std::process::exit(1);
    }

    let mut settings = apply_flags(
        load_config().expect("failed to load configuration"),
        &args,
    );

    let console = args.client || args.interactive;
    if console && settings.cluster.servers.is_empty() {
        settings.cluster.servers = vec!["localhost:8081".to_string()];
    }
    if settings.cluster.proxy && settings.cluster.servers.is_empty() {
        error!("proxy enabled without MQ server list");
        std::process::exit(1);
    }

    // The console client and proxy mode both drive the cluster client; a
    // plain server owns a local registry.
    let broker = Arc::new(if console || settings.cluster.proxy {
        let client = ClusterClient::new(&settings.cluster, settings.server.transport);
        Broker::proxy(client, settings.broker.buffer_size)
    } else {
        let log = settings
            .broker
            .persist
            .then(|| FileLog::new(&settings.broker.persist_dir));
        Broker::local(log, settings.broker.buffer_size)
    });

    if console {
        if let Err(err) = run_console(&args, broker.clone()).await {
            error!(%err, "console client failed");
        }
        broker.close();
        return;
    }

    if settings.cluster.proxy {
        info!("proxy enabled");
    }
    let tls = match (&settings.server.cert_file, &settings.server.key_file) {
        (Some(cert), Some(key)) => {
            info!("tls enabled");
            Some((cert.clone(), key.clone()))
        }
        _ => None,
    };

    let addr = settings.server.address.clone();
    info!(%addr, "mq listening");
    let serve_broker = broker.clone();
    let server = tokio::spawn(async move {
        let result = match settings.server.transport {
            TransportKind::Grpc => transport::grpc::serve(&addr, tls, serve_broker).await,
            TransportKind::Http => transport::http::serve(&addr, tls, serve_broker).await,
        };
        if let Err(err) = result {
            error!(%err, "transport server failed");
            std::process::exit(1);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    info!("mq server stopping");
    broker.close();
    server.abort();
}

/// Console client: publishes stdin lines and/or prints subscribed payloads.
///
/// In interactive mode every line is published and subscribed on the same
/// topic, so a short-TTL dedupe map drops the immediate echo of our own
/// publishes; a ticker flushes the map so it cannot grow without bound.
async fn run_console(args: &Args, broker: Arc<Broker>) -> Result<(), BrokerError> {
    let topic = args.topic.clone().unwrap_or_default();

    let (echo_tx, mut echo_rx) = mpsc::channel::<Bytes>(1000);
    let mut publisher = None;
    if args.publish || args.interactive {
        let broker = broker.clone();
        let topic = topic.clone();
        let interactive = args.interactive;
        let echo_tx = echo_tx.clone();
        publisher = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let payload = Bytes::from(line);
                if interactive {
                    let _ = echo_tx.send(payload.clone()).await;
                }
                if let Err(err) = broker.publish(&topic, payload).await {
                    warn!(%err, "publish failed");
                }
            }
        }));
    }

    if !(args.subscribe || args.interactive) {
        if let Some(task) = publisher {
            let _ = task.await;
        }
        return Ok(());
    }

    let mut sub = broker.subscribe(&topic).await?;
    let (sub_topic, sub_id) = (sub.topic().to_string(), sub.id());

    let ttl = Duration::from_millis(10);
    let mut seen: HashMap<Bytes, Instant> = HashMap::new();
    let mut flush = tokio::time::interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            received = sub.recv() => match received {
                Some(payload) => {
                    // Skip if deduped
                    if seen.get(&payload).is_some_and(|t| t.elapsed() < ttl) {
                        continue;
                    }
                    seen.insert(payload.clone(), Instant::now());
                    println!("{}", String::from_utf8_lossy(&payload));
                }
                None => break,
            },
            Some(payload) = echo_rx.recv() => {
                seen.insert(payload, Instant::now());
            },
            _ = flush.tick() => seen.clear(),
        }
    }

    broker.unsubscribe(&sub_topic, sub_id);
    Ok(())
}
