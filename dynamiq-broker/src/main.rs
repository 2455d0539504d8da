mod args_parse;

use std::{fs::read_to_string, path::Path, sync::Arc};

use anyhow::{Context, Result};
use dynamiq_broker::{
    broker_metrics::{init_metrics, MetricsStats},
    members::join_cluster,
    service_configuration::{LoadConfiguration, ServiceConfiguration},
    BrokerContext, BrokerService, Resources,
};
use dynamiq_core::{
    compression::Lz4Compressor,
    membership::{Peer, StaticMembership},
    metadata::MemoryConfigStore,
    storage::MemoryMessageStore,
};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args_parse::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let args = Args::parse()?;

    // Load the configuration from the specified YAML file
    let config_content = read_to_string(Path::new(&args.config_file))
        .context(format!("Failed to read config file: {}", args.config_file))?;
    let load_config: LoadConfiguration = serde_yaml::from_str(&config_content)?;

    // Attempt to transform LoadConfiguration into ServiceConfiguration
    let mut service_config: ServiceConfiguration = load_config.try_into()?;

    if let Some(node_name) = args.node_name.clone() {
        service_config.node_name = node_name;
    }

    if let Some(seed_servers) = args.seed_server_list() {
        service_config.seed_servers = seed_servers;
    }

    // If `prom_exporter` is provided via command-line args, override the value from the config file
    if let Some(prom_exporter) = args.prom_exporter {
        let prom_address: SocketAddr = prom_exporter.parse().context(format!(
            "Failed to parse into Socket address: {}",
            prom_exporter
        ))?;
        service_config.prom_exporter = Some(prom_address);
    }

    init_metrics(service_config.prom_exporter, &service_config.node_name)?;

    let self_name = format!("{}:{}", service_config.node_name, service_config.seed_port);
    let membership = Arc::new(StaticMembership::new(Peer::new(
        self_name.clone(),
        service_config.host.clone(),
    )));

    // An empty or self-only seed list is a configuration error and ends startup
    join_cluster(
        membership.as_ref(),
        &service_config.node_name,
        &service_config.seed_servers,
        service_config.seed_port,
    )
    .await
    .context("Failed to join the cluster")?;

    info!("Initializing in-memory message and configuration stores");
    let ctx = BrokerContext {
        message_store: Arc::new(MemoryMessageStore::new()),
        resources: Resources::new(Arc::new(MemoryConfigStore::new())),
        compressor: Arc::new(Lz4Compressor),
        stats: Arc::new(MetricsStats),
        membership,
        lease_timeout: service_config.lease_timeout,
        queue_defaults: service_config.queue_defaults.clone(),
    };

    let mut broker = BrokerService::new(ctx);
    broker.start(service_config.sync_interval).await;
    info!(
        cluster = %service_config.cluster_name,
        node = %self_name,
        "Dynamiq broker has started successfully"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("shutdown signal received");
    broker.stop().await;
    Ok(())
}
