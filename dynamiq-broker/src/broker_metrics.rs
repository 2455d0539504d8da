use dynamiq_core::stats::StatsSink;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 2] = [SYNC_CYCLES_TOTAL, SYNC_DURATION_MS_TOTAL];
pub(crate) const GAUGES: [Metric; 2] = [BROKER_QUEUES_SERVED, BROKER_TOPICS_SERVED];

// BROKER Metrics --------------------------

pub(crate) const BROKER_QUEUES_SERVED: Metric = Metric {
    name: "dynamiq_broker_queues_served",
    description: "Total number of queues materialized on this node",
};

pub(crate) const BROKER_TOPICS_SERVED: Metric = Metric {
    name: "dynamiq_broker_topics_served",
    description: "Total number of topics materialized on this node",
};

// SYNC Metrics --------------------------

pub(crate) const SYNC_CYCLES_TOTAL: Metric = Metric {
    name: "dynamiq_sync_cycles_total",
    description: "Total reconciliation passes run per registry",
};

pub(crate) const SYNC_DURATION_MS_TOTAL: Metric = Metric {
    name: "dynamiq_sync_duration_ms_total",
    description: "Time spent in reconciliation passes per registry (ms)",
};

/// Install the Prometheus recorder when an address is configured and describe the broker metrics.
pub fn init_metrics(prom_addr: Option<std::net::SocketAddr>, node_name: &str) -> anyhow::Result<()> {
    info!("initializing metrics exporter");

    if let Some(addr) = prom_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .add_global_label("node", node_name.to_string())
            .install()
            .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;
    }

    for metric in COUNTERS {
        register_counter(metric)
    }

    for metric in GAUGES {
        register_gauge(metric)
    }
    Ok(())
}

fn register_counter(metric: Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

fn register_gauge(metric: Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

/// Queue stats published through the global `metrics` recorder.
///
/// Keys keep their `<queue>.<metric>` form; the Prometheus exporter rewrites the dots.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsStats;

impl StatsSink for MetricsStats {
    fn increment(&self, key: &str, delta: i64) {
        if delta > 0 {
            metrics::counter!(key.to_string()).increment(delta as u64);
        }
    }

    fn increment_gauge(&self, key: &str, delta: i64) {
        metrics::gauge!(key.to_string()).increment(delta as f64);
    }

    fn decrement_gauge(&self, key: &str, delta: i64) {
        metrics::gauge!(key.to_string()).decrement(delta as f64);
    }

    fn set_gauge(&self, key: &str, value: i64) {
        metrics::gauge!(key.to_string()).set(value as f64);
    }
}
