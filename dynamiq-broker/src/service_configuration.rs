use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::resources::QueueSettings;

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub struct LoadConfiguration {
    /// Dynamiq cluster name
    pub cluster_name: String,
    /// This node
    pub node: NodeConfig,
    /// Gossip seed servers as `name:port`, this node may be part of the list
    #[serde(default)]
    pub seed_servers: Vec<String>,
    /// Interval between registry reconciliation passes (ms)
    pub sync_interval_ms: u64,
    /// Longest a consumer waits for a free partition (ms)
    pub lease_timeout_ms: u64,
    /// Queue settings applied where a queue does not set its own
    #[serde(default)]
    pub queue_defaults: QueueDefaults,
}

/// Node identity and ports
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name this node joins the cluster under, combined with the seed port
    pub name: String,
    /// Hostname or IP address the node listens on
    pub host: String,
    /// Gossip port
    pub seed_port: u16,
    /// Prometheus metrics exporter port (optional)
    pub prometheus_port: Option<u16>,
}

/// Queue settings defaults as written in the config file
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueDefaults {
    pub min_partitions: u32,
    pub max_partitions: u32,
    pub max_partition_age_ms: u64,
    pub visibility_timeout_ms: u64,
    pub compressed_messages: bool,
}

impl Default for QueueDefaults {
    fn default() -> Self {
        let settings = QueueSettings::default();
        QueueDefaults {
            min_partitions: settings.min_partitions,
            max_partitions: settings.max_partitions,
            max_partition_age_ms: settings.max_partition_age.as_millis() as u64,
            visibility_timeout_ms: settings.visibility_timeout.as_millis() as u64,
            compressed_messages: settings.compressed_messages,
        }
    }
}

/// configuration settings for the Dynamiq broker service
#[derive(Debug, Clone)]
pub struct ServiceConfiguration {
    /// Dynamiq cluster name
    pub cluster_name: String,
    /// Name this node joins the cluster under
    pub node_name: String,
    /// Hostname or IP address the node listens on
    pub host: String,
    /// Gossip port
    pub seed_port: u16,
    /// Gossip seed servers
    pub seed_servers: Vec<String>,
    /// Prometheus exporter address
    pub prom_exporter: Option<SocketAddr>,
    /// Interval between registry reconciliation passes
    pub sync_interval: Duration,
    /// Longest a consumer waits for a free partition
    pub lease_timeout: Duration,
    /// Queue settings applied where a queue does not set its own
    pub queue_defaults: QueueSettings,
}

/// Implementing the TryFrom trait to transform LoadConfiguration into ServiceConfiguration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        if config.node.name.is_empty() {
            return Err(anyhow::anyhow!("node.name must not be empty"));
        }
        if config.sync_interval_ms == 0 {
            return Err(anyhow::anyhow!("sync_interval_ms must be greater than zero"));
        }

        // Construct prom_exporter from node.host and node.prometheus_port if provided
        let prom_exporter: Option<SocketAddr> = match config.node.prometheus_port {
            Some(port) => Some(
                format!("{}:{}", config.node.host, port)
                    .parse()
                    .context("Failed to create prom_exporter")?,
            ),
            None => None,
        };

        let defaults = config.queue_defaults;
        let queue_defaults = QueueSettings {
            min_partitions: defaults.min_partitions,
            max_partitions: defaults.max_partitions,
            max_partition_age: Duration::from_millis(defaults.max_partition_age_ms),
            visibility_timeout: Duration::from_millis(defaults.visibility_timeout_ms),
            compressed_messages: defaults.compressed_messages,
        }
        .normalized();

        Ok(ServiceConfiguration {
            cluster_name: config.cluster_name,
            node_name: config.node.name,
            host: config.node.host,
            seed_port: config.node.seed_port,
            seed_servers: config.seed_servers,
            prom_exporter,
            sync_interval: Duration::from_millis(config.sync_interval_ms),
            lease_timeout: Duration::from_millis(config.lease_timeout_ms),
            queue_defaults,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
cluster_name: "dynamiq-test"
node:
  name: "node-a"
  host: "127.0.0.1"
  seed_port: 7946
  prometheus_port: 9040
seed_servers: ["node-a:7946", "node-b:7946"]
sync_interval_ms: 1000
lease_timeout_ms: 250
queue_defaults:
  min_partitions: 2
  compressed_messages: true
"#;

    #[test]
    fn yaml_converts_into_service_configuration() -> Result<()> {
        let load: LoadConfiguration = serde_yaml::from_str(CONFIG)?;
        let config: ServiceConfiguration = load.try_into()?;

        assert_eq!(config.node_name, "node-a");
        assert_eq!(config.seed_port, 7946);
        assert_eq!(config.seed_servers.len(), 2);
        assert_eq!(config.prom_exporter, Some("127.0.0.1:9040".parse()?));
        assert_eq!(config.sync_interval, Duration::from_secs(1));
        assert_eq!(config.lease_timeout, Duration::from_millis(250));

        // unset defaults keep the built-in values
        assert_eq!(config.queue_defaults.min_partitions, 2);
        assert_eq!(config.queue_defaults.max_partitions, 10);
        assert_eq!(config.queue_defaults.visibility_timeout, Duration::from_secs(5));
        assert!(config.queue_defaults.compressed_messages);
        Ok(())
    }

    #[test]
    fn zero_sync_interval_is_rejected() -> Result<()> {
        let mut load: LoadConfiguration = serde_yaml::from_str(CONFIG)?;
        load.sync_interval_ms = 0;
        let converted: Result<ServiceConfiguration> = load.try_into();
        assert!(converted.is_err());
        Ok(())
    }
}
