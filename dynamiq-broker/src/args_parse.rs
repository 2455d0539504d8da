use anyhow::Result;
use std::env;

pub(crate) struct Args {
    pub(crate) config_file: String,
    pub(crate) node_name: Option<String>,
    pub(crate) seed_servers: Option<String>,
    pub(crate) prom_exporter: Option<String>,
}

impl Args {
    fn show_usage() {
        println!("Dynamiq Broker Usage:");
        println!("  --config-file        Path to config file (required)");
        println!("  --node-name          Name this node joins the cluster under (overrides node.name)");
        println!("  --seed-servers       Comma-separated seed servers as name:port (overrides seed_servers)");
        println!("  --prom-exporter      Prometheus Exporter http address");
    }

    pub(crate) fn parse() -> Result<Self> {
        Self::parse_from(env::args().collect())
    }

    fn parse_from(args: Vec<String>) -> Result<Self> {
        if args.len() <= 1 {
            Self::show_usage();
            return Err(anyhow::anyhow!("No arguments provided"));
        }

        let mut config_file = None;
        let mut node_name = None;
        let mut seed_servers = None;
        let mut prom_exporter = None;

        let mut args_iter = args.iter().skip(1);
        while let Some(arg) = args_iter.next() {
            match arg.as_str() {
                "--config-file" => {
                    config_file = args_iter.next().map(|s| s.to_string());
                }
                "--node-name" => {
                    node_name = args_iter.next().map(|s| s.to_string());
                }
                "--seed-servers" => {
                    seed_servers = args_iter.next().map(|s| s.to_string());
                }
                "--prom-exporter" => {
                    prom_exporter = args_iter.next().map(|s| s.to_string());
                }
                _ => return Err(anyhow::anyhow!("Unknown argument: {}", arg)),
            }
        }

        Ok(Args {
            config_file: config_file
                .ok_or_else(|| anyhow::anyhow!("Missing required --config-file"))?,
            node_name,
            seed_servers,
            prom_exporter,
        })
    }

    /// Seed servers given on the command line, split on commas.
    pub(crate) fn seed_server_list(&self) -> Option<Vec<String>> {
        self.seed_servers.as_ref().map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("dynamiq-broker")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parses_overrides() {
        let args = Args::parse_from(argv(&[
            "--config-file",
            "config/dynamiq_broker.yml",
            "--node-name",
            "node-b",
            "--seed-servers",
            "node-a:7946, node-c:7946",
        ]))
        .unwrap();

        assert_eq!(args.config_file, "config/dynamiq_broker.yml");
        assert_eq!(args.node_name.as_deref(), Some("node-b"));
        assert_eq!(
            args.seed_server_list(),
            Some(vec!["node-a:7946".to_string(), "node-c:7946".to_string()])
        );
        assert!(args.prom_exporter.is_none());
    }

    #[test]
    fn rejects_missing_config_and_unknown_flags() {
        assert!(Args::parse_from(argv(&[])).is_err());
        assert!(Args::parse_from(argv(&["--node-name", "a"])).is_err());
        assert!(Args::parse_from(argv(&["--config-file", "x", "--raft"])).is_err());
    }
}
